//! The fixed AEE ("Application Execution Environment") error table shared
//! with the DSP side of the FastRPC protocol. Procedure implementations
//! return one of these as their `u32` result word; the listener never
//! interprets the value itself, it only ships it back unchanged.

use std::fmt;

/// One of the 50 entries in the AEE error table. `Success` is always `0`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AeeCode {
    Success = 0,
    GeneralFailure = 1,
    OutOfMemory = 2,
    ClassNotSupported = 3,
    VersionNotSupported = 4,
    AlreadyLoaded = 5,
    UnableToLoad = 6,
    UnableToUnload = 7,
    AlarmPending = 8,
    InvalidTime = 9,
    BadClass = 10,
    BadMetric = 11,
    Expired = 12,
    BadState = 13,
    BadParam = 14,
    SchemeNotSupported = 15,
    BadItem = 16,
    InvalidFormat = 17,
    IncompleteItem = 18,
    NoPersistMemory = 19,
    Unsupported = 20,
    PrivLevel = 21,
    ResourceNotFound = 22,
    Reentered = 23,
    BadTask = 24,
    Allocated = 25,
    Already = 26,
    AdsAuthBad = 27,
    NeedServiceProg = 28,
    MemPtr = 29,
    Heap = 30,
    Idle = 31,
    ItemBusy = 32,
    BadSid = 33,
    NoType = 34,
    NeedMore = 35,
    AdsCaps = 36,
    BadShutdown = 37,
    BufferTooSmall = 38,
    NoSuch = 39,
    AckPending = 40,
    NotOwner = 41,
    InvalidItem = 42,
    NotAllowed = 43,
    BadHandle = 44,
    OutOfHandles = 45,
    Interrupted = 46,
    NoMore = 47,
    CpuException = 48,
    ReadOnly = 49,
}

/// The literal strings from the upstream `aee_strerror` table, reproduced
/// bit-for-bit so DSP-facing diagnostics read the same as on stock firmware.
const AEE_STRERROR: [&str; 50] = [
    "No error",
    "General failure",
    "Insufficient RAM",
    "Specified class unsupported",
    "Version not supported",
    "Object already loaded",
    "Unable to load object/applet",
    "Unable to unload object/applet",
    "Alarm is pending",
    "Invalid time",
    "NULL class object",
    "Invalid metric specified",
    "App/Component Expired",
    "Invalid state",
    "Invalid parameter",
    "Invalid URL scheme",
    "Invalid item",
    "Invalid format",
    "Incomplete item",
    "Insufficient flash",
    "API is not supported",
    "Privileges are insufficient for this operation",
    "Unable to find specified resource",
    "Non re-entrant API re-entered",
    "API called in wrong task context",
    "App/Module left memory allocated when released.",
    "Operation is already in progress",
    "ADS mutual authorization failed",
    "Need service programming",
    "bad memory pointer",
    "heap corruption",
    "Context (system, interface, etc.) is idle",
    "Context (system, interface, etc.) is busy",
    "Invalid subscriber ID",
    "No type detected/found",
    "Need more data/info",
    "ADS Capabilities do not match those required for phone",
    "App failed to close properly",
    "Destination buffer given is too small",
    "No such name, port, socket or service exists or is valid",
    "ACK pending on application",
    "Not an owner authorized to perform the operation",
    "Current item is invalid",
    "Not allowed to perform the operation",
    "Invalid handle",
    "Out of handles",
    "Waitable call is interrupted",
    "No more items available -- reached end",
    "A CPU exception occurred",
    "Cannot change read-only object or parameter",
];

impl AeeCode {
    /// Maps a raw `dl_result`/AEE code received from or destined for the
    /// wire back into a typed variant. Values outside `0..50` collapse to
    /// `GeneralFailure` rather than panicking — the table is fixed-size but
    /// the value arrives over an untrusted channel.
    pub fn from_u32(v: u32) -> AeeCode {
        AEE_BY_INDEX.get(v as usize).copied().unwrap_or(AeeCode::GeneralFailure)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

const AEE_BY_INDEX: [AeeCode; 50] = [
    AeeCode::Success,
    AeeCode::GeneralFailure,
    AeeCode::OutOfMemory,
    AeeCode::ClassNotSupported,
    AeeCode::VersionNotSupported,
    AeeCode::AlreadyLoaded,
    AeeCode::UnableToLoad,
    AeeCode::UnableToUnload,
    AeeCode::AlarmPending,
    AeeCode::InvalidTime,
    AeeCode::BadClass,
    AeeCode::BadMetric,
    AeeCode::Expired,
    AeeCode::BadState,
    AeeCode::BadParam,
    AeeCode::SchemeNotSupported,
    AeeCode::BadItem,
    AeeCode::InvalidFormat,
    AeeCode::IncompleteItem,
    AeeCode::NoPersistMemory,
    AeeCode::Unsupported,
    AeeCode::PrivLevel,
    AeeCode::ResourceNotFound,
    AeeCode::Reentered,
    AeeCode::BadTask,
    AeeCode::Allocated,
    AeeCode::Already,
    AeeCode::AdsAuthBad,
    AeeCode::NeedServiceProg,
    AeeCode::MemPtr,
    AeeCode::Heap,
    AeeCode::Idle,
    AeeCode::ItemBusy,
    AeeCode::BadSid,
    AeeCode::NoType,
    AeeCode::NeedMore,
    AeeCode::AdsCaps,
    AeeCode::BadShutdown,
    AeeCode::BufferTooSmall,
    AeeCode::NoSuch,
    AeeCode::AckPending,
    AeeCode::NotOwner,
    AeeCode::InvalidItem,
    AeeCode::NotAllowed,
    AeeCode::BadHandle,
    AeeCode::OutOfHandles,
    AeeCode::Interrupted,
    AeeCode::NoMore,
    AeeCode::CpuException,
    AeeCode::ReadOnly,
];

impl fmt::Display for AeeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(AEE_STRERROR[*self as usize])
    }
}

/// `dl_result` for "interface not found" returned by `remotectl_open`.
/// Taken from Android's FastRPC stack; not part of the AEE table proper.
pub const DLERROR_NOT_FOUND: i32 = -5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_by_index() {
        for i in 0..50u32 {
            assert_eq!(AeeCode::from_u32(i).as_u32(), i);
        }
    }

    #[test]
    fn out_of_range_collapses_to_general_failure() {
        assert_eq!(AeeCode::from_u32(999), AeeCode::GeneralFailure);
    }

    #[test]
    fn display_matches_upstream_strings() {
        assert_eq!(AeeCode::Success.to_string(), "No error");
        assert_eq!(AeeCode::BadParam.to_string(), "Invalid parameter");
        assert_eq!(AeeCode::ReadOnly.to_string(), "Cannot change read-only object or parameter");
    }
}

//! Session handles: opening and closing a named remote interface through
//! `remotectl` (handle `0`), and the client-side half of the
//! `HEXAGONRPC_FD` contract.
//!
//! Grounded on `fastrpc/hexagonrpcd/localctl.c` (the `remotectl_open`/
//! `remotectl_close` wire convention: method 0 opens, method 1 closes, a
//! signed `dl_result` of `-5` means "no such interface") and
//! `include/libhexagonrpc/session.h`/`libhexagonrpc/session.c` for the
//! environment-variable handshake used by clients that don't spawn the
//! daemon themselves.

use std::env;
use std::os::unix::io::RawFd;

use crate::error::{AeeCode, DLERROR_NOT_FOUND};
use crate::invoke::Invoke;

/// `remotectl` is always handle 0; every other interface is opened through
/// it by name.
pub const REMOTECTL_HANDLE: u32 = 0;

const REMOTECTL_OPEN_METHOD: u8 = 0;
const REMOTECTL_CLOSE_METHOD: u8 = 1;

/// The environment variable the daemon publishes and clients read to learn
/// which already-open file descriptor to issue invocations against.
pub const HEXAGONRPC_FD_VAR: &str = "HEXAGONRPC_FD";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("remote interface {0:?} not found")]
    NotFound(String),
    #[error("remote returned {0}")]
    Remote(AeeCode),
    #[error("kernel ioctl failed: {0}")]
    Kernel(#[from] crate::invoke::Error),
}

/// An open handle to a named remote interface, obtained through
/// `remotectl_open`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Session {
    pub handle: u32,
}

/// Size of the `err_buf` output every `remotectl_open`/`remotectl_close`
/// call carries alongside its scalars, per `remotectl_open_def`/
/// `remotectl_close_def` (`DEFINE_REMOTE_PROCEDURE(0, remotectl_open, 0, 1,
/// 2, 1)` and `(0, remotectl_close, 1, 0, 1, 1)`): one standalone input
/// buffer, no standalone input scalars, and one standalone output buffer
/// alongside the output scalars. The daemon never reads it back, but it
/// must still be registered so the call's buffer counts match the DSP
/// side's expectations.
const ERR_BUF_LEN: usize = 256;

impl Session {
    /// Opens `name` over `fd` via `remotectl`'s method 0: a standalone input
    /// buffer carrying the NUL-terminated name (not a scalar — `in_nums=0,
    /// in_bufs=1` per `remotectl_open_def`), an output scalar carrying the
    /// new handle, a signed `dl_result` (`0` on success, `-5` when the name
    /// is unknown), and a standalone output error-string buffer.
    pub fn open(fd: RawFd, name: &str) -> Result<Session, Error> {
        let mut name_buf = name.as_bytes().to_vec();
        name_buf.push(0);

        let mut handle_out = [0u8; 4];
        let mut dl_result = [0u8; 4];
        let mut err_buf = [0u8; ERR_BUF_LEN];

        let result = Invoke::new(REMOTECTL_HANDLE, REMOTECTL_OPEN_METHOD)
            .in_buf(&name_buf)
            .out_scalar(&mut handle_out)
            .out_scalar(&mut dl_result)
            .out_buf(&mut err_buf)
            .call(fd)?;

        let aee = AeeCode::from_u32(result);
        if aee != AeeCode::Success {
            return Err(Error::Remote(aee));
        }

        let dl_result = i32::from_le_bytes(dl_result);
        if dl_result == DLERROR_NOT_FOUND {
            return Err(Error::NotFound(name.to_string()));
        }
        if dl_result != 0 {
            return Err(Error::Remote(AeeCode::from_u32(dl_result as u32)));
        }

        Ok(Session { handle: u32::from_le_bytes(handle_out) })
    }

    /// Closes the session via `remotectl`'s method 1. Interfaces are
    /// process-lifetime on the DSP side, so this is close to a no-op, but is
    /// still issued for symmetry and to release the handle number. Per
    /// `remotectl_close_def` (`in_nums=1, in_bufs=0, out_nums=1,
    /// out_bufs=1`), the call also carries a `dl_result` scalar and an
    /// error-string buffer on the way back, checked the same way `open`
    /// checks its own `dl_result`.
    pub fn close(self, fd: RawFd) -> Result<(), Error> {
        let handle_in = self.handle.to_le_bytes();
        let mut dl_result = [0u8; 4];
        let mut err_buf = [0u8; ERR_BUF_LEN];

        let result = Invoke::new(REMOTECTL_HANDLE, REMOTECTL_CLOSE_METHOD)
            .in_scalar(&handle_in)
            .out_scalar(&mut dl_result)
            .out_buf(&mut err_buf)
            .call(fd)?;

        let aee = AeeCode::from_u32(result);
        if aee != AeeCode::Success {
            return Err(Error::Remote(aee));
        }

        let dl_result = i32::from_le_bytes(dl_result);
        if dl_result != 0 {
            return Err(Error::Remote(AeeCode::from_u32(dl_result as u32)));
        }

        Ok(())
    }
}

/// Reads `HEXAGONRPC_FD` from the environment, as published by the daemon,
/// and parses it as a non-negative file descriptor. Used by clients that
/// expect the daemon to already be running rather than spawning it.
pub fn fd_from_env() -> Option<RawFd> {
    let raw = env::var(HEXAGONRPC_FD_VAR).ok()?;
    let fd: RawFd = raw.parse().ok()?;
    if fd < 0 {
        None
    } else {
        Some(fd)
    }
}

//! The packed "scalars" word that accompanies every FastRPC invocation,
//! and the descriptor type used to build or interpret one.
//!
//! Grounded on `fastrpc/fastrpc.h`'s `REMOTE_SCALARS_MAKEX`/`_MAKE` macros and
//! spec.md §3/§6's bit layout: `attr[31:29] | method[28:24] | in_count[23:16]
//! | out_count[15:8] | in_handles[7:4] | out_handles[3:0]`.

use std::fmt;

const METHOD_SHIFT: u32 = 24;
const METHOD_MASK: u32 = 0x1f;
const IN_BUFS_SHIFT: u32 = 16;
const IN_BUFS_MASK: u32 = 0xff;
const OUT_BUFS_SHIFT: u32 = 8;
const OUT_BUFS_MASK: u32 = 0xff;
const IN_HANDLES_SHIFT: u32 = 4;
const IN_HANDLES_MASK: u32 = 0xf;
const OUT_HANDLES_SHIFT: u32 = 0;
const OUT_HANDLES_MASK: u32 = 0xf;
const ATTR_SHIFT: u32 = 29;
const ATTR_MASK: u32 = 0x7;

/// A decoded/encodable scalars word, packing the method id, buffer counts
/// and handle counts of a single invocation into 32 bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScalarsWord(u32);

impl ScalarsWord {
    pub fn new(method: u8, in_bufs: u8, out_bufs: u8, in_handles: u8, out_handles: u8) -> ScalarsWord {
        assert!(method & !(METHOD_MASK as u8) == 0, "method id does not fit in 5 bits");
        assert!(in_handles & !(IN_HANDLES_MASK as u8) == 0, "in_handles does not fit in 4 bits");
        assert!(out_handles & !(OUT_HANDLES_MASK as u8) == 0, "out_handles does not fit in 4 bits");

        let raw = ((method as u32 & METHOD_MASK) << METHOD_SHIFT)
            | ((in_bufs as u32 & IN_BUFS_MASK) << IN_BUFS_SHIFT)
            | ((out_bufs as u32 & OUT_BUFS_MASK) << OUT_BUFS_SHIFT)
            | ((in_handles as u32 & IN_HANDLES_MASK) << IN_HANDLES_SHIFT)
            | ((out_handles as u32 & OUT_HANDLES_MASK) << OUT_HANDLES_SHIFT);
        ScalarsWord(raw)
    }

    pub fn from_raw(raw: u32) -> ScalarsWord {
        ScalarsWord(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn method(self) -> u8 {
        ((self.0 >> METHOD_SHIFT) & METHOD_MASK) as u8
    }

    pub fn in_bufs(self) -> u8 {
        ((self.0 >> IN_BUFS_SHIFT) & IN_BUFS_MASK) as u8
    }

    pub fn out_bufs(self) -> u8 {
        ((self.0 >> OUT_BUFS_SHIFT) & OUT_BUFS_MASK) as u8
    }

    pub fn in_handles(self) -> u8 {
        ((self.0 >> IN_HANDLES_SHIFT) & IN_HANDLES_MASK) as u8
    }

    pub fn out_handles(self) -> u8 {
        ((self.0 >> OUT_HANDLES_SHIFT) & OUT_HANDLES_MASK) as u8
    }

    pub fn attr(self) -> u8 {
        ((self.0 >> ATTR_SHIFT) & ATTR_MASK) as u8
    }
}

impl fmt::Display for ScalarsWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "method={} in_bufs={} out_bufs={} in_handles={} out_handles={}",
            self.method(),
            self.in_bufs(),
            self.out_bufs(),
            self.in_handles(),
            self.out_handles()
        )
    }
}

/// Describes the shape of a single remote method: how many input/output
/// scalar buffers and handles an invocation carries. Used both to build a
/// [`ScalarsWord`] for an outgoing call and to validate one arriving over
/// the reverse tunnel against the interface's own idea of the method.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MethodDescriptor {
    pub method_id: u8,
    pub in_bufs: u8,
    pub out_bufs: u8,
    pub in_handles: u8,
    pub out_handles: u8,
}

impl MethodDescriptor {
    pub fn new(method_id: u8, in_bufs: u8, out_bufs: u8) -> MethodDescriptor {
        MethodDescriptor { method_id, in_bufs, out_bufs, in_handles: 0, out_handles: 0 }
    }

    pub fn scalars(self) -> ScalarsWord {
        ScalarsWord::new(self.method_id, self.in_bufs, self.out_bufs, self.in_handles, self.out_handles)
    }

    pub fn matches(self, sc: ScalarsWord) -> bool {
        sc.method() == self.method_id
            && sc.in_bufs() == self.in_bufs
            && sc.out_bufs() == self.out_bufs
            && sc.in_handles() == self.in_handles
            && sc.out_handles() == self.out_handles
    }

    /// Whether the first input buffer is the implicit scratch buffer a
    /// builder-style [`crate::invoke::Invoke`] synthesizes for scalar
    /// arguments (see spec §4.C).
    pub fn needs_input_scratch(self) -> bool {
        self.in_bufs > 0
    }

    pub fn needs_output_scratch(self) -> bool {
        self.out_bufs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_fields() {
        let sc = ScalarsWord::new(0x1b, 0xab, 0xcd, 0x7, 0x9);
        assert_eq!(sc.method(), 0x1b);
        assert_eq!(sc.in_bufs(), 0xab);
        assert_eq!(sc.out_bufs(), 0xcd);
        assert_eq!(sc.in_handles(), 0x7);
        assert_eq!(sc.out_handles(), 0x9);
    }

    #[test]
    fn descriptor_matches_its_own_scalars_word() {
        let d = MethodDescriptor { method_id: 2, in_bufs: 1, out_bufs: 3, in_handles: 0, out_handles: 0 };
        assert!(d.matches(d.scalars()));

        let other = MethodDescriptor { method_id: 3, ..d };
        assert!(!other.matches(d.scalars()));
    }

    #[test]
    #[should_panic]
    fn method_id_must_fit_5_bits() {
        ScalarsWord::new(0x20, 0, 0, 0, 0);
    }
}

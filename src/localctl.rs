//! The host-resident reimplementation of `remotectl`, serving the reverse
//! half of interface lookup: when firmware-side code on the DSP wants to
//! open or close a handle to one of *our* named interfaces, the call comes
//! in over the reverse tunnel to this same handle `0` that forward calls
//! into the DSP's own `remotectl` use (spec §4.G).
//!
//! Grounded on `fastrpc/hexagonrpcd/localctl.c`'s `localctl_open`/
//! `localctl_close` and the `localctl_procs` table `fastrpc_localctl_init`
//! builds from the daemon's own interface array. Not to be confused with
//! [`crate::session`], which models the *other* direction: forward calls
//! this process issues into the DSP firmware's resident `remotectl`.

use crate::error::{AeeCode, DLERROR_NOT_FOUND};
use crate::interface::{AppInterface, ProcSignature};
use crate::iobuf::IoBuffer;

const OPEN_METHOD: u8 = 0;
const CLOSE_METHOD: u8 = 1;

/// Serves `remotectl_open`/`remotectl_close` against the set of interface
/// names registered in this process, by linear search — mirroring
/// `localctl_open`'s own `strcmp` loop over `n_interfaces`.
pub struct LocalCtl {
    names: Vec<String>,
}

impl LocalCtl {
    /// `names` is a snapshot of [`crate::interface::Registry::names`] taken
    /// once at startup, in handle order (`names[0]` is always `"remotectl"`
    /// itself).
    pub fn new(names: Vec<String>) -> LocalCtl {
        LocalCtl { names }
    }

    /// Per `localctl_open`, a name buffer whose last byte isn't NUL is
    /// rejected with `AEE_EBADPARM` before the search loop ever runs — the
    /// daemon never scans an unterminated buffer looking for a match.
    fn open(&self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        let scratch = &inbufs[0].payload;
        let outlen = u32::from_le_bytes(scratch[4..8].try_into().unwrap()) as usize;

        let name_buf = &inbufs[1].payload;
        if name_buf.last() != Some(&0) {
            return AeeCode::BadParam.as_u32();
        }
        let name_end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
        let name = String::from_utf8_lossy(&name_buf[..name_end]);

        let (handle, error) = match self.names.iter().position(|n| n == &name) {
            Some(handle) => (handle as u32, 0i32),
            None => (0u32, DLERROR_NOT_FOUND),
        };

        outbufs[0].payload[0..4].copy_from_slice(&handle.to_le_bytes());
        outbufs[0].payload[4..8].copy_from_slice(&error.to_le_bytes());
        debug_assert_eq!(outbufs[1].payload.len(), outlen);

        if error != 0 {
            // `localctl_open` returns the raw dl_result directly as its AEE
            // result, rather than wrapping "not found" in `AEE_EFAILED`.
            error as u32
        } else {
            AeeCode::Success.as_u32()
        }
    }

    fn close(&self, outbufs: &mut [IoBuffer]) -> u32 {
        outbufs[0].payload[0..4].copy_from_slice(&0u32.to_le_bytes());
        AeeCode::Success.as_u32()
    }
}

impl AppInterface for LocalCtl {
    fn signature(&self, method: u8) -> Option<ProcSignature> {
        match method {
            OPEN_METHOD => Some(ProcSignature::new(OPEN_METHOD, 2, 1, 2, 1)),
            CLOSE_METHOD => Some(ProcSignature::new(CLOSE_METHOD, 1, 0, 1, 1)),
            _ => None,
        }
    }

    fn call(&mut self, method: u8, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        match method {
            OPEN_METHOD => self.open(inbufs, outbufs),
            CLOSE_METHOD => self.close(outbufs),
            _ => AeeCode::Unsupported.as_u32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_open(ctl: &LocalCtl, inlen: u32, outlen: u32, name: &str) -> (u32, Vec<IoBuffer>) {
        let mut name_buf = name.as_bytes().to_vec();
        name_buf.push(0);

        let mut scratch = Vec::new();
        scratch.extend_from_slice(&inlen.to_le_bytes());
        scratch.extend_from_slice(&outlen.to_le_bytes());
        scratch.extend_from_slice(&(name_buf.len() as u32).to_le_bytes());

        let inbufs = vec![IoBuffer::new(scratch), IoBuffer::new(name_buf)];
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 8]), IoBuffer::new(vec![0u8; outlen as usize])];

        let mut ctl = LocalCtl::new(ctl.names.clone());
        let result = ctl.call(OPEN_METHOD, &inbufs, &mut outbufs);
        (result, outbufs)
    }

    #[test]
    fn opens_a_known_interface_by_name() {
        let ctl = LocalCtl::new(vec!["remotectl".into(), "apps_std".into()]);
        let (result, outbufs) = call_open(&ctl, 16, 0, "apps_std");
        assert_eq!(result, AeeCode::Success.as_u32());
        assert_eq!(u32::from_le_bytes(outbufs[0].payload[0..4].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(outbufs[0].payload[4..8].try_into().unwrap()), 0);
    }

    #[test]
    fn unknown_name_returns_the_raw_not_found_code() {
        let ctl = LocalCtl::new(vec!["remotectl".into(), "apps_std".into()]);
        let (result, outbufs) = call_open(&ctl, 16, 0, "nonexistent");
        assert_eq!(result as i32, DLERROR_NOT_FOUND);
        assert_eq!(i32::from_le_bytes(outbufs[0].payload[4..8].try_into().unwrap()), DLERROR_NOT_FOUND);
    }

    #[test]
    fn rejects_a_non_nul_terminated_name() {
        let mut scratch = Vec::new();
        scratch.extend_from_slice(&16u32.to_le_bytes());
        scratch.extend_from_slice(&0u32.to_le_bytes());
        scratch.extend_from_slice(&4u32.to_le_bytes());

        let inbufs = vec![IoBuffer::new(scratch), IoBuffer::new(b"oops".to_vec())];
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 8]), IoBuffer::new(vec![0u8; 0])];

        let mut ctl = LocalCtl::new(vec!["remotectl".into(), "apps_std".into()]);
        let result = ctl.call(OPEN_METHOD, &inbufs, &mut outbufs);
        assert_eq!(result, AeeCode::BadParam.as_u32());
    }

    #[test]
    fn close_always_succeeds_with_zero_dlerr_len() {
        let mut ctl = LocalCtl::new(vec!["remotectl".into()]);
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 4]), IoBuffer::new(vec![0u8; 32])];
        let result = ctl.call(CLOSE_METHOD, &[IoBuffer::new(vec![0u8; 8])], &mut outbufs);
        assert_eq!(result, AeeCode::Success.as_u32());
        assert_eq!(u32::from_le_bytes(outbufs[0].payload[0..4].try_into().unwrap()), 0);
    }
}

//! A builder over a single FastRPC invocation, replacing the C side's
//! variadic-argument calling convention (`remote_handle_invoke(handle, sc,
//! pra)` with a hand-packed `pra` array) with a typestate-free but
//! order-checked builder: `Invoke::new(handle, method_id)
//! .in_scalar(x).in_buf(&b).out_scalar(&mut y).out_buf(&mut buf).call(fd)`.
//!
//! Per spec §3/§4.C, the first input entry is a synthesized scratch buffer
//! holding, in order, every input scalar, every input buffer's length, and
//! every output buffer's maximum length — `in_scalar` appends directly,
//! while `in_buf`/`out_buf` each append their own length word to the same
//! scratch buffer in addition to recording the buffer itself. This mirrors
//! `vfastrpc2`'s `inbuf` array, filled the same way ahead of the ioctl.

use std::os::unix::io::RawFd;

use crate::kernel::{self, InvokeArg};
use crate::method::MethodDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kernel ioctl failed: {0}")]
    Kernel(#[from] std::io::Error),
}

struct ScalarOut<'a> {
    dest: &'a mut [u8],
    offset: usize,
}

/// Accumulates the arguments of one invocation before issuing it.
pub struct Invoke<'a> {
    handle: u32,
    method_id: u8,
    in_scratch: Vec<u8>,
    out_scratch_len: usize,
    out_scalars: Vec<ScalarOut<'a>>,
    in_bufs: Vec<Vec<u8>>,
    out_bufs: Vec<&'a mut [u8]>,
    in_handles: Vec<RawFd>,
    out_handles: Vec<RawFd>,
}

impl<'a> Invoke<'a> {
    pub fn new(handle: u32, method_id: u8) -> Invoke<'a> {
        Invoke {
            handle,
            method_id,
            in_scratch: Vec::new(),
            out_scratch_len: 0,
            out_scalars: Vec::new(),
            in_bufs: Vec::new(),
            out_bufs: Vec::new(),
            in_handles: Vec::new(),
            out_handles: Vec::new(),
        }
    }

    /// Appends `bytes` to the implicit input scratch buffer.
    pub fn in_scalar(mut self, bytes: &[u8]) -> Self {
        self.in_scratch.extend_from_slice(bytes);
        self
    }

    /// Adds a standalone input buffer, distinct from the scalar scratch
    /// buffer. Per spec §3, the first input entry carries every standalone
    /// input buffer's length alongside the input scalars, so this also
    /// appends `bytes.len()` to the scratch buffer — callers must finish
    /// every `in_scalar` call before the first `in_buf`/`out_buf` call, the
    /// same ordering `vfastrpc2` builds its `inbuf` array in.
    pub fn in_buf(mut self, bytes: &[u8]) -> Self {
        self.in_scratch.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.in_bufs.push(bytes.to_vec());
        self
    }

    /// Reserves room in the implicit output scratch buffer and records
    /// where to scatter the result once the call completes.
    pub fn out_scalar(mut self, dest: &'a mut [u8]) -> Self {
        let offset = self.out_scratch_len;
        self.out_scratch_len += dest.len();
        self.out_scalars.push(ScalarOut { dest, offset });
        self
    }

    /// Adds a standalone output buffer, written directly by the kernel
    /// rather than scattered out of the scratch buffer. Per spec §3, the
    /// first input entry also carries every standalone output buffer's
    /// *maximum* size, following all input-buffer lengths, so this appends
    /// `dest.len()` to the scratch buffer — call every `in_buf` before the
    /// first `out_buf`.
    pub fn out_buf(mut self, dest: &'a mut [u8]) -> Self {
        self.in_scratch.extend_from_slice(&(dest.len() as u32).to_le_bytes());
        self.out_bufs.push(dest);
        self
    }

    pub fn in_handle(mut self, fd: RawFd) -> Self {
        self.in_handles.push(fd);
        self
    }

    pub fn out_handle(mut self, fd: RawFd) -> Self {
        self.out_handles.push(fd);
        self
    }

    /// Issues the invocation over `fd` and returns the `u32` result word
    /// (an [`crate::error::AeeCode`] in disguise — callers decide whether to
    /// decode it). On success, output scratch bytes are scattered back into
    /// every slice registered via [`Invoke::out_scalar`].
    pub fn call(mut self, fd: RawFd) -> Result<u32, Error> {
        let descriptor = MethodDescriptor {
            method_id: self.method_id,
            in_bufs: (!self.in_scratch.is_empty() as u8) + self.in_bufs.len() as u8,
            out_bufs: (self.out_scratch_len > 0) as u8 + self.out_bufs.len() as u8,
            in_handles: self.in_handles.len() as u8,
            out_handles: self.out_handles.len() as u8,
        };
        let sc = descriptor.scalars();

        let mut out_scratch = vec![0u8; self.out_scratch_len];
        let mut args = Vec::new();

        if !self.in_scratch.is_empty() {
            args.push(InvokeArg::buffer(self.in_scratch.as_ptr(), self.in_scratch.len()));
        }
        for buf in &self.in_bufs {
            args.push(InvokeArg::buffer(buf.as_ptr(), buf.len()));
        }
        if self.out_scratch_len > 0 {
            args.push(InvokeArg::buffer_mut(out_scratch.as_mut_ptr(), out_scratch.len()));
        }
        for buf in &mut self.out_bufs {
            args.push(InvokeArg::buffer_mut(buf.as_mut_ptr(), buf.len()));
        }
        for h in &self.in_handles {
            args.push(InvokeArg { ptr: 0, length: 0, fd: *h, reserved: 0 });
        }
        for h in &self.out_handles {
            args.push(InvokeArg { ptr: 0, length: 0, fd: *h, reserved: 0 });
        }

        let result = kernel::invoke(fd, self.handle, sc.raw(), &mut args)?;

        for scalar in &mut self.out_scalars {
            let len = scalar.dest.len();
            scalar.dest.copy_from_slice(&out_scratch[scalar.offset..scalar.offset + len]);
        }

        Ok(result)
    }
}

#[cfg(test)]
impl<'a> Invoke<'a> {
    /// Test-only peek at the synthesized scratch buffer, so callers
    /// elsewhere in the crate can assert on wire shape without stubbing out
    /// the kernel ioctl.
    pub(crate) fn in_scratch_for_test(&self) -> &[u8] {
        &self.in_scratch
    }

    pub(crate) fn in_buf_count_for_test(&self) -> usize {
        self.in_bufs.len()
    }

    pub(crate) fn out_buf_count_for_test(&self) -> usize {
        self.out_bufs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_layout_is_sequential() {
        let mut a = [0u8; 4];
        let mut b = [0u8; 2];
        let invoke = Invoke::new(0, 1).out_scalar(&mut a).out_scalar(&mut b);
        assert_eq!(invoke.out_scalars[0].offset, 0);
        assert_eq!(invoke.out_scalars[1].offset, 4);
        assert_eq!(invoke.out_scratch_len, 6);
    }

    /// Per spec §3, the first input entry is `in_scalars ++ in-buffer
    /// lengths ++ out-buffer max lengths`, in that order.
    #[test]
    fn in_scratch_carries_scalars_then_buffer_lengths_then_out_buffer_max_sizes() {
        let mut out = [0u8; 8];
        let invoke = Invoke::new(0, 1)
            .in_scalar(&7u32.to_le_bytes())
            .in_buf(&[1, 2, 3])
            .out_buf(&mut out);

        let mut expected = Vec::new();
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(&8u32.to_le_bytes());
        assert_eq!(invoke.in_scratch, expected);
    }
}

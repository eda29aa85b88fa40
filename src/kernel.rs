//! The raw ioctl surface of the FastRPC kernel character device
//! (`/dev/adsprpc-smd` and friends). This is the only module that talks to
//! the driver directly; everything above it (`invoke`, `session`,
//! `listener`) goes through the small set of functions here.
//!
//! Struct shapes and ioctl numbers mirror the upstream `fastrpc.h` UAPI
//! header. The driver itself is an external collaborator (spec §1); getting
//! every reserved field bit-exact matters less than keeping one place in
//! the codebase that owns the unsafe boundary.

use std::io;
use std::os::unix::io::RawFd;

use nix::{ioctl_none, ioctl_readwrite};

const FASTRPC_IOCTL_MAGIC: u8 = b'R';

/// One argument slot of an invocation: either a data buffer (`ptr`/`length`)
/// or a handle-carrying buffer (`fd` set, `ptr`/`length` describing the
/// mapped region).
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct InvokeArg {
    pub ptr: u64,
    pub length: u64,
    pub fd: i32,
    pub reserved: u32,
}

impl InvokeArg {
    pub fn buffer(ptr: *const u8, length: usize) -> InvokeArg {
        InvokeArg { ptr: ptr as u64, length: length as u64, fd: -1, reserved: 0 }
    }

    pub fn buffer_mut(ptr: *mut u8, length: usize) -> InvokeArg {
        InvokeArg { ptr: ptr as u64, length: length as u64, fd: -1, reserved: 0 }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FastrpcInvoke {
    pub handle: u32,
    pub sc: u32,
    pub args: u64,
    /// Filled in by the driver: the remote procedure's own AEE result code.
    /// Distinct from the ioctl's own return value, which reports whether
    /// the IPC round-trip itself succeeded.
    pub result: u32,
}

ioctl_readwrite!(fastrpc_ioctl_invoke, FASTRPC_IOCTL_MAGIC, 1, FastrpcInvoke);
ioctl_none!(fastrpc_ioctl_init_attach, FASTRPC_IOCTL_MAGIC, 10);
ioctl_none!(fastrpc_ioctl_init_attach_sns, FASTRPC_IOCTL_MAGIC, 16);

/// Issues a single `FASTRPC_IOCTL_INVOKE`: `handle`/`sc` select the remote
/// interface and method, `args` is the already-assembled argument vector
/// (scalar and buffer slots in the order `in_bufs, out_bufs, in_handles,
/// out_handles`, per spec §4.C). Returns the remote AEE result word; an
/// `Err` here means the IPC itself failed, not that the remote procedure
/// returned a non-success code.
pub fn invoke(fd: RawFd, handle: u32, sc: u32, args: &mut [InvokeArg]) -> io::Result<u32> {
    let mut req = FastrpcInvoke { handle, sc, args: args.as_mut_ptr() as u64, result: 0 };
    unsafe { fastrpc_ioctl_invoke(fd, &mut req) }.map_err(nix_to_io)?;
    Ok(req.result)
}

/// Attaches this process to the default DSP domain (`INIT_ATTACH`).
pub fn init_attach(fd: RawFd) -> io::Result<()> {
    unsafe { fastrpc_ioctl_init_attach(fd) }.map(|_| ()).map_err(nix_to_io)
}

/// Attaches to the sensors ("SNS") DSP domain (`INIT_ATTACH_SNS`), used when
/// `-s` is passed on the command line.
pub fn init_attach_sns(fd: RawFd) -> io::Result<()> {
    unsafe { fastrpc_ioctl_init_attach_sns(fd) }.map(|_| ()).map_err(nix_to_io)
}

fn nix_to_io(e: nix::Error) -> io::Error {
    match e {
        nix::Error::Sys(errno) => io::Error::from_raw_os_error(errno as i32),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

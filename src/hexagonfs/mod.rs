//! HexagonFS: the read-only virtual filesystem the daemon presents to the
//! DSP through `apps_std` (spec §4.E). A static tree of virtual directories
//! and host-backed mount points ([`tree`]) is resolved path segment by
//! segment into a small table of open descriptors ([`fd`]); [`builder`]
//! constructs the one tree instance the daemon actually serves.
//!
//! Grounded on `hexagonrpcd/hexagonfs.h` and `hexagonrpcd/hexagonfs.c`.

pub mod builder;
pub mod fd;
pub mod tree;

pub use fd::{FdTable, Stat, Whence};
pub use tree::{NodeId, NodeKind, Tree};

/// Mirrors the `-errno` values `hexagonfs.c`'s functions return directly,
/// rather than wrapping them in an AEE code: `apps_std` translates these
/// into the raw negative-errno results the DSP-side libc expects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("bad file descriptor")]
    BadFd,
    #[error("operation not supported")]
    Unsupported,
    #[error("host filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The negative errno `apps_std` puts on the wire for this error.
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::NotFound => -libc::ENOENT,
            Error::NotADirectory => -libc::ENOTDIR,
            Error::TooManyOpenFiles => -libc::EMFILE,
            Error::BadFd => -libc::EBADF,
            Error::Unsupported => -libc::ENOSYS,
            Error::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

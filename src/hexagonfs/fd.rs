//! The per-session table of open HexagonFS descriptors and the path
//! resolution algorithm that fills it.
//!
//! Grounded on `hexagonrpcd/hexagonfs.c`'s `hexagonfs_openat`/
//! `hexagonfs_close`/`allocate_file_number`/`pop_dir`/
//! `destroy_file_descriptor`. There, a directory reached while resolving a
//! path is a plain pointer into the very struct that may also already sit in
//! the table (`fds[selected]`); the new descriptor that direction produces
//! keeps that pointer as `up`, so a single `struct hexagonfs_fd` can have two
//! owners — the table slot and the child's `up` field — and is only freed
//! once `destroy_file_descriptor` walks a chain that hits an
//! `is_assigned` struct. `Rc<RefCell<_>>` here gets the identical sharing
//! (a directory can be both a live table entry and an ancestor of several
//! other open descriptors at once) without tracking assignment by hand:
//! an ancestor is dropped exactly when its last `Rc` — table slot or
//! descendant — goes away.

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;
use nix::dir::Dir;
use nix::fcntl::{self, AtFlags, OFlag};
use nix::sys::stat::{self, Mode};

use super::tree::{NodeId, NodeKind, Tree};
use super::Error;

bitflags! {
    /// The type bits of a POSIX mode word, `S_IFDIR`/`S_IFREG`. HexagonFS
    /// never reports any other file type (spec §4.E/§4.F: every node is
    /// either a directory or a regular file).
    struct FileTypeBits: u32 {
        const DIRECTORY = libc::S_IFDIR as u32;
        const REGULAR = libc::S_IFREG as u32;
    }
}

pub const MAX_FD: usize = 256;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

fn to_nix_whence(whence: Whence) -> nix::unistd::Whence {
    match whence {
        Whence::Set => nix::unistd::Whence::SeekSet,
        Whence::Cur => nix::unistd::Whence::SeekCur,
        Whence::End => nix::unistd::Whence::SeekEnd,
    }
}

/// A filesystem-agnostic stat result, the fields `apps_std_stat` actually
/// puts on the wire (spec §4.H).
#[derive(Copy, Clone, Debug, Default)]
pub struct Stat {
    pub size: u64,
    pub is_dir: bool,
    /// Full POSIX mode word (type bits + permission bits), per spec §4.E's
    /// per-kind table: every directory is `0o555` (r+x all), every regular
    /// file `0o444` (r-only) — the filesystem never reports a writeable
    /// mode, mapped or virtual.
    pub mode: u32,
    pub atime: (i64, i64),
    pub mtime: (i64, i64),
    pub ctime: (i64, i64),
}

/// Permission bits every directory and regular file reports, respectively.
/// HexagonFS is read-only end to end (spec §1 Non-goals), so these are the
/// only two permission words that ever appear.
const DIR_PERM: u32 = 0o555;
const FILE_PERM: u32 = 0o444;

fn file_mode(is_dir: bool) -> u32 {
    if is_dir {
        FileTypeBits::DIRECTORY.bits() | DIR_PERM
    } else {
        FileTypeBits::REGULAR.bits() | FILE_PERM
    }
}

/// What an open descriptor is actually backed by, independent of which
/// `NodeId` (if any) named it. Descending out of a `Virt` node into a
/// `Mapped`/`SysfsMapped` subtree hands resolution off to the host
/// filesystem from then on — mirroring `mapped_openat` calling back into
/// itself via `openat(2)` rather than ever consulting the static tree again.
enum Resource {
    Virt { node: NodeId },
    HostFile { file: File, is_sysfs: bool },
    HostDir { dir: Dir, is_sysfs: bool },
    /// A `MissingSysfs` node whose host path didn't exist at open time.
    Empty,
}

struct OpenFd {
    resource: RefCell<Resource>,
    up: Option<SharedFd>,
}

type SharedFd = Rc<OpenFd>;

/// The bounded table of descriptors open against one [`Tree`], as used by
/// one `apps_std` session (spec §4.E/§5: one table per FastRPC session,
/// capped at [`MAX_FD`] entries, no state persisted across restarts).
pub struct FdTable {
    tree: Arc<Tree>,
    slots: Vec<Option<SharedFd>>,
    root_fd: i32,
}

impl FdTable {
    /// Opens `root` and installs it as the table's own root descriptor,
    /// mirroring `hexagonfs_open_root`. The returned table's `root_fd()` is
    /// the descriptor number absolute paths (and `apps_std`'s `-1` "no
    /// directory" convention) resolve against.
    pub fn new(tree: Arc<Tree>, root: NodeId) -> Result<FdTable, Error> {
        let mut table = FdTable { tree, slots: (0..MAX_FD).map(|_| None).collect(), root_fd: 0 };
        let resource = table.open_kind(table.tree.kind(root).clone(), root, true)?;
        let root_fd =
            table.allocate(Rc::new(OpenFd { resource: RefCell::new(resource), up: None }))?;
        table.root_fd = root_fd;
        Ok(table)
    }

    pub fn root_fd(&self) -> i32 {
        self.root_fd
    }

    fn slot(&self, fd: i32) -> Result<&SharedFd, Error> {
        if fd < 0 || fd as usize >= MAX_FD {
            return Err(Error::BadFd);
        }
        self.slots[fd as usize].as_ref().ok_or(Error::BadFd)
    }

    fn allocate(&mut self, fd: SharedFd) -> Result<i32, Error> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(fd);
                return Ok(i as i32);
            }
        }
        Err(Error::TooManyOpenFiles)
    }

    /// Resolves `name` relative to `dirfd` (or to the table's root if `name`
    /// starts with `/`) and installs the result as a new table entry,
    /// mirroring `hexagonfs_openat`.
    pub fn openat(&mut self, dirfd: i32, name: &str) -> Result<i32, Error> {
        let (start, rest) = if let Some(rest) = name.strip_prefix('/') {
            (Rc::clone(self.slot(self.root_fd)?), rest)
        } else {
            (Rc::clone(self.slot(dirfd)?), name)
        };

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let trailing_slash = rest.ends_with('/');

        let mut current = start;
        for (i, segment) in segments.iter().enumerate() {
            let expect_dir = i + 1 < segments.len() || trailing_slash;
            current = match *segment {
                "." => current,
                ".." => current.up.as_ref().map(Rc::clone).unwrap_or(current),
                segment => self.descend(&current, segment, expect_dir)?,
            };
        }

        self.allocate(current)
    }

    fn descend(&self, dir: &SharedFd, segment: &str, expect_dir: bool) -> Result<SharedFd, Error> {
        enum Next {
            Static(NodeId),
            Host(RawFd, bool),
        }

        let next = match &*dir.resource.borrow() {
            Resource::Virt { node } => Next::Static(self.tree.lookup(*node, segment)?),
            Resource::HostDir { dir, is_sysfs } => Next::Host(dir.as_raw_fd(), *is_sysfs),
            Resource::HostFile { .. } => return Err(Error::NotADirectory),
            // `plat_subtype_name_openat` always returns `-ENOTDIR`, whether
            // or not the backing sysfs file exists — a missing-sysfs stub
            // never has children to descend into.
            Resource::Empty => return Err(Error::NotADirectory),
        };

        let resource = match next {
            Next::Static(node) => self.open_kind(self.tree.kind(node).clone(), node, expect_dir)?,
            Next::Host(parent_fd, is_sysfs) => host_openat(parent_fd, segment, expect_dir, is_sysfs)?,
        };

        Ok(Rc::new(OpenFd { resource: RefCell::new(resource), up: Some(Rc::clone(dir)) }))
    }

    fn open_kind(&self, kind: NodeKind, node: NodeId, expect_dir: bool) -> Result<Resource, Error> {
        match kind {
            NodeKind::Virt { .. } => Ok(Resource::Virt { node }),
            NodeKind::Mapped { host_path } => open_host_path(&host_path, expect_dir, false),
            NodeKind::SysfsMapped { host_path } => open_host_path(&host_path, expect_dir, true),
            NodeKind::MissingSysfs { host_path } => match open_host_path(&host_path, expect_dir, true) {
                Ok(resource) => Ok(resource),
                Err(Error::NotFound) => Ok(Resource::Empty),
                Err(e) => Err(e),
            },
        }
    }

    pub fn close(&mut self, fd: i32) -> Result<(), Error> {
        if fd < 0 || fd as usize >= MAX_FD {
            return Err(Error::BadFd);
        }
        if self.slots[fd as usize].take().is_none() {
            return Err(Error::BadFd);
        }
        Ok(())
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Error> {
        let slot = self.slot(fd)?;
        match &mut *slot.resource.borrow_mut() {
            Resource::Virt { .. } => Err(Error::Unsupported),
            Resource::HostFile { file, .. } => Ok(file.read(buf)?),
            Resource::HostDir { .. } => Err(Error::NotADirectory),
            Resource::Empty => Ok(0),
        }
    }

    /// Returns the next directory entry's name, or `None` once the
    /// directory is exhausted, mirroring `mapped_readdir`'s
    /// empty-name-with-zero-errno convention on end-of-directory.
    pub fn readdir(&self, fd: i32) -> Result<Option<String>, Error> {
        let slot = self.slot(fd)?;
        match &mut *slot.resource.borrow_mut() {
            Resource::Virt { .. } => Err(Error::Unsupported),
            Resource::HostFile { .. } => Err(Error::NotADirectory),
            Resource::HostDir { dir, .. } => match dir.iter().next() {
                Some(Ok(entry)) => Ok(Some(entry.file_name().to_string_lossy().into_owned())),
                Some(Err(e)) => Err(nix_to_hexagonfs_error(e)),
                None => Ok(None),
            },
            Resource::Empty => Ok(None),
        }
    }

    pub fn lseek(&self, fd: i32, offset: i64, whence: Whence) -> Result<i64, Error> {
        let slot = self.slot(fd)?;
        match &mut *slot.resource.borrow_mut() {
            Resource::Virt { .. } => Err(Error::Unsupported),
            Resource::HostFile { file, .. } => {
                Ok(file.seek(to_std_seekfrom(offset, whence))? as i64)
            }
            Resource::HostDir { dir, .. } => {
                if whence == Whence::Set && offset == 0 {
                    dir.rewind();
                    Ok(0)
                } else {
                    nix::unistd::lseek(dir.as_raw_fd(), offset, to_nix_whence(whence))
                        .map_err(nix_to_hexagonfs_error)
                }
            }
            Resource::Empty => Ok(0),
        }
    }

    pub fn fstat(&self, fd: i32) -> Result<Stat, Error> {
        let slot = self.slot(fd)?;
        match &*slot.resource.borrow() {
            Resource::Virt { .. } => Ok(Stat { size: 0, is_dir: true, mode: file_mode(true), ..Stat::default() }),
            Resource::HostFile { file, is_sysfs } => {
                let st = stat::fstat(file.as_raw_fd()).map_err(nix_to_hexagonfs_error)?;
                Ok(stat_from_host(&st, *is_sysfs))
            }
            Resource::HostDir { dir, is_sysfs } => {
                let st = stat::fstat(dir.as_raw_fd()).map_err(nix_to_hexagonfs_error)?;
                Ok(stat_from_host(&st, *is_sysfs))
            }
            Resource::Empty => Ok(Stat { size: 0, is_dir: false, mode: file_mode(false), ..Stat::default() }),
        }
    }
}

fn to_std_seekfrom(offset: i64, whence: Whence) -> SeekFrom {
    match whence {
        Whence::Set => SeekFrom::Start(offset as u64),
        Whence::Cur => SeekFrom::Current(offset),
        Whence::End => SeekFrom::End(offset),
    }
}

fn stat_from_host(st: &libc::stat, is_sysfs: bool) -> Stat {
    let is_dir = is_dir_mode(st.st_mode);
    let size = if is_sysfs && !is_dir { 256 } else { st.st_size as u64 };
    Stat {
        size,
        is_dir,
        mode: file_mode(is_dir),
        atime: (st.st_atime, st.st_atime_nsec),
        mtime: (st.st_mtime, st.st_mtime_nsec),
        ctime: (st.st_ctime, st.st_ctime_nsec),
    }
}

fn is_dir_mode(mode: libc::mode_t) -> bool {
    (mode as u32 & libc::S_IFMT) == libc::S_IFDIR
}

fn open_host_path(path: &Path, expect_dir: bool, is_sysfs: bool) -> Result<Resource, Error> {
    let st = stat::stat(path).map_err(nix_to_hexagonfs_error)?;
    let is_dir = is_dir_mode(st.st_mode);
    if is_dir {
        let dir = Dir::open(path, OFlag::O_RDONLY | OFlag::O_DIRECTORY, Mode::empty())
            .map_err(nix_to_hexagonfs_error)?;
        Ok(Resource::HostDir { dir, is_sysfs })
    } else {
        if expect_dir {
            return Err(Error::NotADirectory);
        }
        let file = File::open(path)?;
        Ok(Resource::HostFile { file, is_sysfs })
    }
}

fn host_openat(parent_fd: RawFd, segment: &str, expect_dir: bool, is_sysfs: bool) -> Result<Resource, Error> {
    let st = stat::fstatat(parent_fd, segment, AtFlags::empty()).map_err(nix_to_hexagonfs_error)?;
    let is_dir = is_dir_mode(st.st_mode);
    if is_dir {
        let raw = fcntl::openat(parent_fd, segment, OFlag::O_RDONLY | OFlag::O_DIRECTORY, Mode::empty())
            .map_err(nix_to_hexagonfs_error)?;
        let dir = Dir::from_fd(raw).map_err(nix_to_hexagonfs_error)?;
        Ok(Resource::HostDir { dir, is_sysfs })
    } else {
        if expect_dir {
            return Err(Error::NotADirectory);
        }
        let raw = fcntl::openat(parent_fd, segment, OFlag::O_RDONLY, Mode::empty())
            .map_err(nix_to_hexagonfs_error)?;
        let file = unsafe { File::from_raw_fd(raw) };
        Ok(Resource::HostFile { file, is_sysfs })
    }
}

fn nix_to_hexagonfs_error(e: nix::Error) -> Error {
    match e {
        nix::Error::Sys(nix::errno::Errno::ENOENT) => Error::NotFound,
        nix::Error::Sys(nix::errno::Errno::ENOTDIR) => Error::NotADirectory,
        nix::Error::Sys(errno) => Error::Io(std::io::Error::from_raw_os_error(errno as i32)),
        other => Error::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn file_mode_packs_type_and_permission_bits() {
        assert_eq!(file_mode(true), libc::S_IFDIR as u32 | 0o555);
        assert_eq!(file_mode(false), libc::S_IFREG as u32 | 0o444);
    }

    fn single_virt_tree() -> (Arc<Tree>, NodeId) {
        let mut tree = Tree::new();
        let root = tree.alloc_virt_dir("/");
        let sub = tree.alloc_virt_dir("sub");
        tree.link(root, "sub", sub);
        (Arc::new(tree), root)
    }

    #[test]
    fn dotdot_past_root_is_a_no_op() {
        let (tree, root) = single_virt_tree();
        let mut table = FdTable::new(tree, root).unwrap();
        let fd = table.openat(table.root_fd(), "..").unwrap();
        assert_eq!(fd, table.root_fd());
    }

    #[test]
    fn opening_a_missing_virtual_child_fails() {
        let (tree, root) = single_virt_tree();
        let mut table = FdTable::new(tree, root).unwrap();
        assert!(matches!(table.openat(table.root_fd(), "nope"), Err(Error::NotFound)));
    }

    #[test]
    fn a_virtual_directory_does_not_support_read() {
        let (tree, root) = single_virt_tree();
        let mut table = FdTable::new(tree, root).unwrap();
        let fd = table.openat(table.root_fd(), "sub").unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(table.read(fd, &mut buf), Err(Error::Unsupported)));
    }

    #[test]
    fn closing_an_unknown_fd_is_bad_fd() {
        let (tree, root) = single_virt_tree();
        let mut table = FdTable::new(tree, root).unwrap();
        assert!(matches!(table.close(200), Err(Error::BadFd)));
    }

    #[test]
    fn descending_past_a_missing_sysfs_stub_is_not_a_directory() {
        let mut tree = Tree::new();
        let root = tree.alloc_virt_dir("/");
        let stub = tree.alloc_missing_sysfs("subtype", PathBuf::from("/nonexistent/plat_subtype"));
        tree.link(root, "subtype", stub);
        let tree = Arc::new(tree);

        let mut table = FdTable::new(tree, root).unwrap();
        let fd = table.openat(table.root_fd(), "subtype").unwrap();
        assert!(matches!(table.read(fd, &mut [0u8; 4]), Ok(0)));
        assert!(matches!(table.openat(fd, "anything"), Err(Error::NotADirectory)));
    }

    #[test]
    fn table_exhausts_after_max_fd_opens() {
        let mut tree = Tree::new();
        let root = tree.alloc_virt_dir("/");
        for i in 0..300 {
            let child = tree.alloc_virt_dir(format!("d{}", i));
            tree.link(root, format!("d{}", i), child);
        }
        let tree = Arc::new(tree);
        let mut table = FdTable::new(tree, root).unwrap();
        let mut last_err = None;
        for i in 0..300 {
            if let Err(e) = table.openat(table.root_fd(), &format!("d{}", i)) {
                last_err = Some(e);
                break;
            }
        }
        assert!(matches!(last_err, Some(Error::TooManyOpenFiles)));
    }
}

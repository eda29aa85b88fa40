//! The `apps_std` interface: the DSP-side C library's file/directory
//! operations, serviced against [`crate::hexagonfs`] (spec §4.H).
//!
//! Grounded on `fastrpc/hexagonrpcd/apps_std.c`. The `.def` headers
//! declaring each method's exact scalar/buffer counts weren't in the
//! retrieval pack; the [`crate::interface::ProcSignature`] for each method
//! below is derived directly from how `apps_std.c` indexes its own
//! `inbufs`/`outbufs` arrays (e.g. `apps_std_fread`'s `inbufs[0]` is a
//! 2-word `{fd, buf_size}` struct and its `outbufs[1]` is the standalone
//! read buffer).

use std::sync::Arc;

use crate::error::AeeCode;
use crate::hexagonfs::{self, FdTable, NodeId, Tree, Whence};
use crate::interface::{AppInterface, ProcSignature};
use crate::iobuf::IoBuffer;

const FFLUSH: u8 = 2;
const FCLOSE: u8 = 3;
const FREAD: u8 = 4;
const FSEEK: u8 = 9;
const FOPEN_WITH_ENV: u8 = 19;
const OPENDIR: u8 = 26;
const CLOSEDIR: u8 = 27;
const READDIR: u8 = 28;
const STAT: u8 = 31;

/// The three `whence` values the DSP side may request, in the order
/// `apps_std_whence_table` lists them. Unlike the C table, an out-of-range
/// index here is rejected rather than read out of bounds.
const WHENCE_TABLE: [Whence; 3] = [Whence::Set, Whence::Cur, Whence::End];

pub struct AppsStd {
    table: FdTable,
    adsp_avs_cfg_dirfd: Option<i32>,
    adsp_library_dirfd: Option<i32>,
}

impl AppsStd {
    pub fn new(tree: Arc<Tree>, root: NodeId) -> Result<AppsStd, hexagonfs::Error> {
        let table = FdTable::new(tree, root)?;
        Ok(AppsStd { table, adsp_avs_cfg_dirfd: None, adsp_library_dirfd: None })
    }

    /// Lazily opens the two search directories `fopen_with_env` resolves
    /// `ADSP_AVS_CFG_PATH`/`ADSP_LIBRARY_PATH` against, mirroring
    /// `open_dirs`.
    fn open_dirs(&mut self) -> Result<(i32, i32), hexagonfs::Error> {
        if self.adsp_avs_cfg_dirfd.is_none() {
            self.adsp_avs_cfg_dirfd = Some(self.table.openat(self.table.root_fd(), "/usr/lib/qcom/adsp/avs/")?);
        }
        if self.adsp_library_dirfd.is_none() {
            self.adsp_library_dirfd = Some(self.table.openat(self.table.root_fd(), "/usr/lib/qcom/adsp/")?);
        }
        Ok((self.adsp_avs_cfg_dirfd.unwrap(), self.adsp_library_dirfd.unwrap()))
    }

    /// A placeholder completing any pending I/O; HexagonFS descriptors are
    /// never buffered, so there's nothing to flush. Mirrors
    /// `apps_std_fflush`.
    fn fflush(&mut self, outbufs: &mut [IoBuffer]) -> u32 {
        for byte in &mut outbufs[0].payload {
            *byte = 0;
        }
        AeeCode::Success.as_u32()
    }

    fn fclose(&mut self, inbufs: &[IoBuffer]) -> u32 {
        let fd = u32::from_le_bytes(inbufs[0].payload[0..4].try_into().unwrap()) as i32;
        match self.table.close(fd) {
            Ok(()) => AeeCode::Success.as_u32(),
            Err(e) => {
                log::warn!("apps_std: could not close {}: {}", fd, e);
                AeeCode::GeneralFailure.as_u32()
            }
        }
    }

    fn fread(&mut self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        let fd = u32::from_le_bytes(inbufs[0].payload[0..4].try_into().unwrap()) as i32;
        let buf_size = u32::from_le_bytes(inbufs[0].payload[4..8].try_into().unwrap()) as usize;

        let written = match self.table.read(fd, &mut outbufs[1].payload) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("apps_std: could not read fd {}: {}", fd, e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        outbufs[0].payload[0..4].copy_from_slice(&(written as u32).to_le_bytes());
        let is_eof = (written < buf_size) as u32;
        outbufs[0].payload[4..8].copy_from_slice(&is_eof.to_le_bytes());
        AeeCode::Success.as_u32()
    }

    fn fseek(&mut self, inbufs: &[IoBuffer]) -> u32 {
        let fd = u32::from_le_bytes(inbufs[0].payload[0..4].try_into().unwrap()) as i32;
        let pos = u32::from_le_bytes(inbufs[0].payload[4..8].try_into().unwrap()) as i64;
        let whence_idx = u32::from_le_bytes(inbufs[0].payload[8..12].try_into().unwrap()) as usize;

        let whence = match WHENCE_TABLE.get(whence_idx) {
            Some(w) => *w,
            None => {
                log::warn!("apps_std: fseek with out-of-range whence {}", whence_idx);
                return AeeCode::BadParam.as_u32();
            }
        };

        match self.table.lseek(fd, pos, whence) {
            Ok(_) => AeeCode::Success.as_u32(),
            Err(e) => {
                log::warn!("apps_std: could not seek fd {}: {}", fd, e);
                AeeCode::GeneralFailure.as_u32()
            }
        }
    }

    fn fopen_with_env(&mut self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        if !is_nul_terminated(&inbufs[1].payload) || !is_nul_terminated(&inbufs[3].payload) || !is_nul_terminated(&inbufs[4].payload)
        {
            return AeeCode::BadParam.as_u32();
        }

        match inbufs[4].payload.first() {
            Some(b'w') | Some(b'a') => {
                log::warn!("apps_std: refusing to open a file for writing");
                return AeeCode::Unsupported.as_u32();
            }
            _ => {}
        }

        let (avs_cfg_fd, library_fd) = match self.open_dirs() {
            Ok(fds) => fds,
            Err(e) => {
                log::warn!("apps_std: could not open search directories: {}", e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        let envvarname = trim_nul(&inbufs[1].payload);
        let dirfd = if envvarname == b"ADSP_LIBRARY_PATH" {
            library_fd
        } else if envvarname == b"ADSP_AVS_CFG_PATH" {
            avs_cfg_fd
        } else {
            log::warn!("apps_std: unknown search directory {:?}", String::from_utf8_lossy(envvarname));
            return AeeCode::BadParam.as_u32();
        };

        let name = String::from_utf8_lossy(trim_nul(&inbufs[3].payload)).into_owned();
        let fd = match self.table.openat(dirfd, &name) {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("apps_std: could not open {}: {}", name, e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        outbufs[0].payload[0..4].copy_from_slice(&(fd as u32).to_le_bytes());
        AeeCode::Success.as_u32()
    }

    fn opendir(&mut self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        if !is_nul_terminated(&inbufs[1].payload) {
            return AeeCode::BadParam.as_u32();
        }

        if let Err(e) = self.open_dirs() {
            log::warn!("apps_std: could not open search directories: {}", e);
            return AeeCode::GeneralFailure.as_u32();
        }

        let name = String::from_utf8_lossy(trim_nul(&inbufs[1].payload)).into_owned();
        let fd = match self.table.openat(self.table.root_fd(), &name) {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("apps_std: could not open {}: {}", name, e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        outbufs[0].payload[0..8].copy_from_slice(&(fd as u64).to_le_bytes());
        AeeCode::Success.as_u32()
    }

    fn closedir(&mut self, inbufs: &[IoBuffer]) -> u32 {
        let dir = u64::from_le_bytes(inbufs[0].payload[0..8].try_into().unwrap()) as i32;
        match self.table.close(dir) {
            Ok(()) => AeeCode::Success.as_u32(),
            Err(_) => AeeCode::GeneralFailure.as_u32(),
        }
    }

    fn readdir(&mut self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        let dir = u64::from_le_bytes(inbufs[0].payload[0..8].try_into().unwrap()) as i32;

        let entry = match self.table.readdir(dir) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("apps_std: could not read directory {}: {}", dir, e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        let out = &mut outbufs[0].payload;
        out[0..4].copy_from_slice(&0u32.to_le_bytes());
        for b in &mut out[4..4 + 255] {
            *b = 0;
        }
        let is_eof = match &entry {
            Some(name) => {
                let bytes = name.as_bytes();
                let len = bytes.len().min(254);
                out[4..4 + len].copy_from_slice(&bytes[..len]);
                false
            }
            None => true,
        };
        out[4 + 255..4 + 255 + 4].copy_from_slice(&(is_eof as u32).to_le_bytes());

        AeeCode::Success.as_u32()
    }

    fn stat(&mut self, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        let pathname_len = u32::from_le_bytes(inbufs[0].payload[4..8].try_into().unwrap()) as usize;
        let pathname = String::from_utf8_lossy(&inbufs[1].payload[..pathname_len.min(inbufs[1].payload.len())]).into_owned();

        if let Err(e) = self.open_dirs() {
            log::warn!("apps_std: could not open search directories: {}", e);
            return AeeCode::GeneralFailure.as_u32();
        }

        let fd = match self.table.openat(self.table.root_fd(), &pathname) {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("apps_std: could not open {}: {}", pathname, e);
                return AeeCode::GeneralFailure.as_u32();
            }
        };

        let stats = match self.table.fstat(fd) {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("apps_std: could not stat {}: {}", pathname, e);
                let _ = self.table.close(fd);
                return AeeCode::GeneralFailure.as_u32();
            }
        };
        let _ = self.table.close(fd);

        let out = &mut outbufs[0].payload;
        out[0..8].copy_from_slice(&0u64.to_le_bytes()); // tsz, unused
        out[8..16].copy_from_slice(&0u64.to_le_bytes()); // dev, not tracked
        out[16..24].copy_from_slice(&0u64.to_le_bytes()); // ino, not tracked
        out[24..28].copy_from_slice(&stats.mode.to_le_bytes());
        out[28..32].copy_from_slice(&1u32.to_le_bytes()); // nlink
        out[32..40].copy_from_slice(&0u64.to_le_bytes()); // rdev, not tracked
        out[40..48].copy_from_slice(&stats.size.to_le_bytes());
        out[48..56].copy_from_slice(&stats.atime.0.to_le_bytes());
        out[56..64].copy_from_slice(&stats.atime.1.to_le_bytes());
        out[64..72].copy_from_slice(&stats.mtime.0.to_le_bytes());
        out[72..80].copy_from_slice(&stats.mtime.1.to_le_bytes());
        // `ctime` is assigned the nanosecond component rather than the
        // seconds component here, reproducing `apps_std_stat`'s own
        // `first_out->ctime = stats.st_ctim.tv_nsec` assignment verbatim.
        out[80..88].copy_from_slice(&stats.ctime.1.to_le_bytes());
        out[88..96].copy_from_slice(&stats.ctime.1.to_le_bytes());

        AeeCode::Success.as_u32()
    }
}

fn is_nul_terminated(buf: &[u8]) -> bool {
    matches!(buf.last(), Some(0))
}

fn trim_nul(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

impl AppInterface for AppsStd {
    fn signature(&self, method: u8) -> Option<ProcSignature> {
        match method {
            FFLUSH => Some(ProcSignature::new(FFLUSH, 1, 0, 0, 1)),
            FCLOSE => Some(ProcSignature::new(FCLOSE, 1, 0, 0, 0)),
            FREAD => Some(ProcSignature::new(FREAD, 2, 0, 2, 1)),
            FSEEK => Some(ProcSignature::new(FSEEK, 3, 0, 0, 0)),
            FOPEN_WITH_ENV => Some(ProcSignature::new(FOPEN_WITH_ENV, 4, 4, 1, 0)),
            OPENDIR => Some(ProcSignature::new(OPENDIR, 1, 1, 2, 0)),
            CLOSEDIR => Some(ProcSignature::new(CLOSEDIR, 2, 0, 0, 0)),
            READDIR => Some(ProcSignature::new(READDIR, 2, 0, 0, 1)),
            STAT => Some(ProcSignature::new(STAT, 2, 1, 24, 0)),
            _ => None,
        }
    }

    fn call(&mut self, method: u8, inbufs: &[IoBuffer], outbufs: &mut [IoBuffer]) -> u32 {
        match method {
            FFLUSH => self.fflush(outbufs),
            FCLOSE => self.fclose(inbufs),
            FREAD => self.fread(inbufs, outbufs),
            FSEEK => self.fseek(inbufs),
            FOPEN_WITH_ENV => self.fopen_with_env(inbufs, outbufs),
            OPENDIR => self.opendir(inbufs, outbufs),
            CLOSEDIR => self.closedir(inbufs),
            READDIR => self.readdir(inbufs, outbufs),
            STAT => self.stat(inbufs, outbufs),
            _ => AeeCode::Unsupported.as_u32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexagonfs::Tree;
    use std::path::PathBuf;

    fn std_with_single_file(contents: &'static [u8]) -> (AppsStd, i32) {
        let mut tree = Tree::new();
        let root = tree.alloc_virt_dir("/");
        let tmp = tempfile_with(contents);
        let node = tree.alloc_mapped("f", tmp.clone());
        tree.link(root, "f", node);
        let avs = tree.alloc_virt_dir("avs");
        let adsp = tree.alloc_virt_dir("adsp");
        let qcom = tree.alloc_virt_dir("qcom");
        let lib = tree.alloc_virt_dir("lib");
        let usr = tree.alloc_virt_dir("usr");
        tree.link(adsp, "avs", avs);
        tree.link(qcom, "adsp", adsp);
        tree.link(lib, "qcom", qcom);
        tree.link(usr, "lib", lib);
        tree.link(root, "usr", usr);

        let mut apps = AppsStd::new(Arc::new(tree), root).unwrap();
        let fd = apps.table.openat(apps.table.root_fd(), "/f").unwrap();
        (apps, fd)
    }

    fn tempfile_with(contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("hexagonrpcd-test-{:?}", std::thread::current().id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn fread_reports_eof_when_short() {
        let (mut apps, fd) = std_with_single_file(b"hi");
        let mut inbuf = Vec::new();
        inbuf.extend_from_slice(&(fd as u32).to_le_bytes());
        inbuf.extend_from_slice(&16u32.to_le_bytes());
        let inbufs = vec![IoBuffer::new(inbuf)];
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 8]), IoBuffer::new(vec![0u8; 16])];

        let result = apps.call(FREAD, &inbufs, &mut outbufs);
        assert_eq!(result, AeeCode::Success.as_u32());
        assert_eq!(u32::from_le_bytes(outbufs[0].payload[0..4].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(outbufs[0].payload[4..8].try_into().unwrap()), 1);
        assert_eq!(&outbufs[1].payload[..2], b"hi");
    }

    #[test]
    fn fseek_rejects_out_of_range_whence() {
        let (mut apps, fd) = std_with_single_file(b"hi");
        let mut inbuf = Vec::new();
        inbuf.extend_from_slice(&(fd as u32).to_le_bytes());
        inbuf.extend_from_slice(&0u32.to_le_bytes());
        inbuf.extend_from_slice(&99u32.to_le_bytes());
        let result = apps.call(FSEEK, &[IoBuffer::new(inbuf)], &mut []);
        assert_eq!(result, AeeCode::BadParam.as_u32());
    }

    #[test]
    fn fopen_with_env_rejects_write_mode() {
        let (mut apps, _fd) = std_with_single_file(b"hi");
        let mut inbuf = Vec::new();
        inbuf.extend_from_slice(&17u32.to_le_bytes());
        inbuf.extend_from_slice(&1u32.to_le_bytes());
        inbuf.extend_from_slice(&2u32.to_le_bytes());
        inbuf.extend_from_slice(&2u32.to_le_bytes());
        let inbufs = vec![
            IoBuffer::new(inbuf),
            IoBuffer::new(b"ADSP_LIBRARY_PATH\0".to_vec()),
            IoBuffer::new(b"\0".to_vec()),
            IoBuffer::new(b"f\0".to_vec()),
            IoBuffer::new(b"w\0".to_vec()),
        ];
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 4])];
        let result = apps.call(FOPEN_WITH_ENV, &inbufs, &mut outbufs);
        assert_eq!(result, AeeCode::Unsupported.as_u32());
    }

    #[test]
    fn stat_assigns_ctime_from_the_nanosecond_field() {
        let (mut apps, _fd) = std_with_single_file(b"hello");
        let mut inbuf = Vec::new();
        inbuf.extend_from_slice(&0u32.to_le_bytes());
        inbuf.extend_from_slice(&2u32.to_le_bytes());
        let inbufs = vec![IoBuffer::new(inbuf), IoBuffer::new(b"/f".to_vec())];
        let mut outbufs = vec![IoBuffer::new(vec![0u8; 96])];
        let result = apps.call(STAT, &inbufs, &mut outbufs);
        assert_eq!(result, AeeCode::Success.as_u32());
        let ctime = i64::from_le_bytes(outbufs[0].payload[80..88].try_into().unwrap());
        let ctimensec = i64::from_le_bytes(outbufs[0].payload[88..96].try_into().unwrap());
        assert_eq!(ctime, ctimensec);
    }
}

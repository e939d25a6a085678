//! Timestamps, directory listing, and whole-filesystem statistics, plus the
//! small pieces of `getattr`/`open` that don't belong to any of the named
//! traits but are still needed by the host-facing entry points in
//! [`crate::f_host`].

use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::{AllocatorSupport, AttrSupport, DirectorySupport, FileIoSupport, InodeSupport, StatFs};
use mmapfs_api::types::{EntryKind, RawInode, Timespec};

/// Nominal block size reported by `statfs`, used only to convert byte counts
/// into block counts for host consumption — the allocator itself has no
/// notion of blocks, it deals in exact byte-sized regions.
const STATFS_BLOCK_SIZE: u64 = 1024;

impl Fs {
    /// Attributes of the inode at `path`. A thin, explicitly-named alias for
    /// [`InodeSupport::resolve`], kept separate because `getattr` is a host
    /// entry point in its own right and not a trait method.
    pub fn getattr(&mut self, path: &str) -> Result<RawInode, FsError> {
        self.resolve(path)
    }

    /// Validate that `path` names an existing regular file, the way a host
    /// `open` call would before handing back a file descriptor. There is no
    /// descriptor table at this layer: every
    /// subsequent `read`/`write` re-resolves `path` from scratch.
    pub fn open(&mut self, path: &str) -> Result<(), FsError> {
        let inode = self.resolve(path)?;
        if inode.kind == EntryKind::Directory {
            return Err(FsError::IsADirectory);
        }
        Ok(())
    }
}

impl AttrSupport for Fs {
    fn readdir(&mut self, path: &str) -> Result<Vec<String>, FsError> {
        let dir = self.resolve(path)?;
        if dir.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory);
        }
        self.children_of(&dir)?
            .into_iter()
            .map(|(_, child)| Ok(crate::b_inode::decode_name(&child.name)))
            .collect()
    }

    fn utimens(&mut self, path: &str, atime: Timespec, mtime: Timespec) -> Result<(), FsError> {
        let (parent, _parent_offset, basename) = self.resolve_parent(path)?;
        let (child_offset, mut inode) =
            self.find_child(&parent, basename)?.ok_or(FsError::NotFound)?;
        inode.atime = atime;
        inode.mtime = mtime;
        self.write_inode(child_offset, &inode)
    }

    fn statfs(&self) -> StatFs {
        let header = self.0.header();
        let block_size = STATFS_BLOCK_SIZE;
        let blocks_free = self.total_free() / block_size;
        StatFs {
            block_size,
            blocks: header.usable_size / block_size,
            blocks_free,
            blocks_available: blocks_free,
            name_max: mmapfs_api::types::NAME_MAX as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmapfs_api::image::MappedImage;
    use std::fs::{create_dir_all, remove_dir_all};
    use std::path::PathBuf;

    fn disk_prep_path(name: &str) -> PathBuf {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("fs-images-stat-".to_string() + name);
        create_dir_all(&path).unwrap();
        path.push("img");
        path
    }

    fn with_fs<F: FnOnce(&mut Fs)>(name: &str, size: u64, f: F) {
        let path = disk_prep_path(name);
        let mut image = MappedImage::create(&path, size).unwrap();
        let mut fs = unsafe { Fs::acquire(image.fsptr(), image.fssize()) }.unwrap();
        f(&mut fs);
        drop(fs);
        drop(image);
        remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn readdir_lists_direct_children_only() {
        with_fs("readdir", 1 << 16, |fs| {
            fs.mkdir("/sub").unwrap();
            fs.mknod("/a.txt").unwrap();
            fs.mknod("/sub/b.txt").unwrap();
            let mut names = fs.readdir("/").unwrap();
            names.sort();
            assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
        });
    }

    #[test]
    fn utimens_updates_only_the_named_entry() {
        with_fs("utimens", 1 << 16, |fs| {
            fs.mknod("/a.txt").unwrap();
            let stamp = Timespec { sec: 1234, nsec: 5 };
            fs.utimens("/a.txt", stamp, stamp).unwrap();
            let inode = fs.getattr("/a.txt").unwrap();
            assert_eq!(inode.atime, stamp);
            assert_eq!(inode.mtime, stamp);
        });
    }

    #[test]
    fn statfs_reports_shrinking_free_space() {
        with_fs("statfs", 1 << 16, |fs| {
            let before = fs.statfs();
            fs.mknod("/a.txt").unwrap();
            let data = vec![7u8; 4096];
            fs.write("/a.txt", &data, 0).unwrap();
            let after = fs.statfs();
            assert!(after.blocks_free < before.blocks_free);
            assert_eq!(before.blocks, after.blocks);
        });
    }
}

//! Directory entry creation, removal, and renaming.
//!
//! Every mutation here re-reads whatever parent inode it needs immediately
//! before touching it, rather than threading an in-memory copy through
//! several steps: [`Fs::remove_child`]'s compact-with-last-slot technique can
//! relocate *any* slot in a children array, including one a caller might
//! still be holding a stale offset for. Re-reading by name after each
//! mutation is cheap (one linear scan) and side-steps that entirely.

use crate::b_inode::encode_name;
use crate::e_fileio::now;
use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::{AllocatorSupport, DirectorySupport, InodeSupport};
use mmapfs_api::types::{EntryKind, RawInode};

impl Fs {
    fn create_entry(&mut self, path: &str, kind: EntryKind) -> Result<(), FsError> {
        let (mut parent, parent_offset, name) = self.resolve_parent(path)?;
        if self.find_child(&parent, name)?.is_some() {
            return Err(FsError::Exists);
        }
        let stamp = now();
        let child = RawInode {
            name: encode_name(name)?,
            kind,
            atime: stamp,
            mtime: stamp,
            ..RawInode::default()
        };
        self.append_child(parent_offset, &mut parent, &child)?;
        Ok(())
    }

    /// Remove `name` (already known to exist at `child_offset`, under
    /// `parent`) from the directory at `parent_offset`, freeing the removed
    /// entry's own content first if it is a regular file.
    fn remove_entry(
        &mut self,
        parent_offset: u64,
        parent: &mut RawInode,
        child_offset: u64,
        child: &RawInode,
    ) -> Result<(), FsError> {
        if child.kind == EntryKind::RegularFile {
            self.free_block_chain(child.first_block_offset)?;
        }
        self.remove_child(parent_offset, parent, child_offset)
    }
}

impl DirectorySupport for Fs {
    fn mknod(&mut self, path: &str) -> Result<(), FsError> {
        self.create_entry(path, EntryKind::RegularFile)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        self.create_entry(path, EntryKind::Directory)
    }

    fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let (mut parent, parent_offset, name) = self.resolve_parent(path)?;
        let (child_offset, child) = self.find_child(&parent, name)?.ok_or(FsError::NotFound)?;
        if child.kind == EntryKind::Directory {
            return Err(FsError::IsADirectory);
        }
        self.remove_entry(parent_offset, &mut parent, child_offset, &child)
    }

    fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let (mut parent, parent_offset, name) = self.resolve_parent(path)?;
        let (child_offset, child) = self.find_child(&parent, name)?.ok_or(FsError::NotFound)?;
        if child.kind != EntryKind::Directory {
            return Err(FsError::NotADirectory);
        }
        if child.child_count != 0 {
            return Err(FsError::NotEmpty);
        }
        self.remove_child(parent_offset, &mut parent, child_offset)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        if from == to {
            return Ok(());
        }
        let (src_parent, src_parent_offset, src_name) = self.resolve_parent(from)?;
        self.find_child(&src_parent, src_name)?
            .ok_or(FsError::NotFound)?;
        let (dst_parent, dst_parent_offset, dst_name) = self.resolve_parent(to)?;

        // Overwrite policy: a pre-existing same-named target is removed
        // before the move, so the directory's one-entry-per-name invariant
        // never has to tolerate a transient duplicate.
        if let Some((existing_offset, existing)) = self.find_child(&dst_parent, dst_name)? {
            if existing.kind == EntryKind::Directory && existing.child_count != 0 {
                return Err(FsError::NotEmpty);
            }
            let mut dst_parent_now = self.read_inode(dst_parent_offset)?;
            self.remove_entry(
                dst_parent_offset,
                &mut dst_parent_now,
                existing_offset,
                &existing,
            )?;
        }

        // Re-resolve the source by name: removing the target above may have
        // compacted the very array the source lives in, if `from` and `to`
        // share a parent.
        let mut src_parent_now = self.read_inode(src_parent_offset)?;
        let (src_offset, src_inode) = self
            .find_child(&src_parent_now, src_name)?
            .ok_or(FsError::NotFound)?;
        self.remove_child(src_parent_offset, &mut src_parent_now, src_offset)?;

        let mut dst_parent_now = self.read_inode(dst_parent_offset)?;
        let moved = RawInode {
            name: encode_name(dst_name)?,
            ..src_inode
        };
        self.append_child(dst_parent_offset, &mut dst_parent_now, &moved)?;
        Ok(())
    }
}

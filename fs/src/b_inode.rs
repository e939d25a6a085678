//! Inode access and path resolution.
//!
//! A directory inode's children live in a contiguous array of `RawInode`s
//! allocated as a single block, referenced by `children_offset`; there is no
//! pointer-per-child indirection. Resolving a path is a walk from the root,
//! one children-array scan per component; nothing here ever caches a result
//! across calls.

use crate::c_path;
use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::{AllocatorSupport, InodeSupport};
use mmapfs_api::types::{RawInode, INODE_SIZE, NAME_MAX, NAME_SLOT};

/// Encode `name` into a NUL-terminated, zero-padded name slot.
pub fn encode_name(name: &str) -> Result<[u8; NAME_SLOT], FsError> {
    let bytes = name.as_bytes();
    if bytes.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    let mut slot = [0u8; NAME_SLOT];
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(slot)
}

/// Decode a name slot back into a `String`, stopping at the first NUL.
pub fn decode_name(slot: &[u8; NAME_SLOT]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

impl Fs {
    /// Read the inode at absolute offset `offset`.
    pub(crate) fn read_inode(&self, offset: u64) -> Result<RawInode, FsError> {
        Ok(self.0.read_struct(offset, *INODE_SIZE)?)
    }

    /// Write `inode` at absolute offset `offset`.
    pub(crate) fn write_inode(&mut self, offset: u64, inode: &RawInode) -> Result<(), FsError> {
        Ok(self.0.write_struct(offset, *INODE_SIZE, inode)?)
    }

    /// Every `(slot offset, inode)` pair in `dir`'s children array, in
    /// on-image order. Indices are not stable across mutations
    /// (compact-with-last-slot removal can move the last child into any
    /// earlier slot), so callers must not retain an index past a mutation.
    pub(crate) fn children_of(&self, dir: &RawInode) -> Result<Vec<(u64, RawInode)>, FsError> {
        let mut out = Vec::with_capacity(dir.child_count as usize);
        for i in 0..dir.child_count {
            let offset = dir.children_offset + i * (*INODE_SIZE);
            out.push((offset, self.read_inode(offset)?));
        }
        Ok(out)
    }

    /// Find the child named `name` directly under `dir`.
    pub(crate) fn find_child(
        &self,
        dir: &RawInode,
        name: &str,
    ) -> Result<Option<(u64, RawInode)>, FsError> {
        for i in 0..dir.child_count {
            let offset = dir.children_offset + i * (*INODE_SIZE);
            let child = self.read_inode(offset)?;
            if decode_name(&child.name) == name {
                return Ok(Some((offset, child)));
            }
        }
        Ok(None)
    }

    /// Append `child` to `dir`'s children array, growing the backing
    /// allocation with [`AllocatorSupport::reallocate`], and write the
    /// updated parent back at `dir_offset`. Returns the new child's slot
    /// offset.
    pub(crate) fn append_child(
        &mut self,
        dir_offset: u64,
        dir: &mut RawInode,
        child: &RawInode,
    ) -> Result<u64, FsError> {
        let new_count = dir.child_count + 1;
        let new_size = new_count * (*INODE_SIZE);
        let new_children_offset = if dir.children_offset == 0 {
            self.allocate(new_size)?
        } else {
            self.reallocate(dir.children_offset, new_size)?
        };
        if new_children_offset == 0 {
            return Err(FsError::OutOfSpace);
        }
        dir.children_offset = new_children_offset;
        let slot_offset = new_children_offset + dir.child_count * (*INODE_SIZE);
        self.write_inode(slot_offset, child)?;
        dir.child_count = new_count;
        self.write_inode(dir_offset, dir)?;
        Ok(slot_offset)
    }

    /// Remove the child at `child_offset` from `dir`'s children array using
    /// compact-with-last-slot: the last child is copied into the removed
    /// slot (unless it *is* the removed slot), then the array is shrunk by
    /// one. Child indices are not stable across this call.
    pub(crate) fn remove_child(
        &mut self,
        dir_offset: u64,
        dir: &mut RawInode,
        child_offset: u64,
    ) -> Result<(), FsError> {
        let last_offset = dir.children_offset + (dir.child_count - 1) * (*INODE_SIZE);
        if child_offset != last_offset {
            self.0.copy_within(last_offset, child_offset, *INODE_SIZE)?;
        }
        let new_count = dir.child_count - 1;
        if new_count == 0 {
            self.free(dir.children_offset)?;
            dir.children_offset = 0;
        } else {
            let new_size = new_count * (*INODE_SIZE);
            let new_offset = self.reallocate(dir.children_offset, new_size)?;
            if new_offset == 0 {
                return Err(FsError::OutOfSpace);
            }
            dir.children_offset = new_offset;
        }
        dir.child_count = new_count;
        self.write_inode(dir_offset, dir)
    }
}

impl InodeSupport for Fs {
    fn root(&mut self) -> Result<RawInode, FsError> {
        let root_offset = self.0.header().root_offset;
        if root_offset == 0 {
            self.create_root()?;
        }
        self.read_inode(self.0.header().root_offset)
    }

    fn resolve(&mut self, path: &str) -> Result<RawInode, FsError> {
        let components = c_path::split(path)?;
        let (basename, ancestors) = match components.split_last() {
            Some(split) => split,
            None => return self.root(),
        };
        let mut current = self.root()?;
        for component in ancestors {
            match self.find_child(&current, component)? {
                Some((_, child)) => {
                    if child.kind != mmapfs_api::types::EntryKind::Directory {
                        return Err(FsError::NotADirectory);
                    }
                    current = child;
                }
                None => return Err(FsError::NotFound),
            }
        }
        match self.find_child(&current, basename)? {
            Some((_, child)) => Ok(child),
            None => Err(FsError::NotFound),
        }
    }

    fn resolve_parent<'a>(
        &mut self,
        path: &'a str,
    ) -> Result<(RawInode, u64, &'a str), FsError> {
        let components = c_path::split(path)?;
        let (basename, ancestors) = components
            .split_last()
            .ok_or(FsError::BadState("root has no parent"))?;

        let mut current = self.root()?;
        let mut current_offset = self.0.header().root_offset;
        for component in ancestors {
            match self.find_child(&current, component)? {
                Some((offset, child)) => {
                    if child.kind != mmapfs_api::types::EntryKind::Directory {
                        return Err(FsError::NotADirectory);
                    }
                    current_offset = offset;
                    current = child;
                }
                None => return Err(FsError::NotFound),
            }
        }
        Ok((current, current_offset, basename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_through_slot() {
        let slot = encode_name("report.txt").unwrap();
        assert_eq!(decode_name(&slot), "report.txt");
    }

    #[test]
    fn overlong_name_is_rejected() {
        let long = "x".repeat(NAME_MAX + 1);
        assert!(matches!(encode_name(&long), Err(FsError::NameTooLong)));
    }
}

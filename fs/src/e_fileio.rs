//! Byte-level file content operations.
//!
//! A regular file's content is a singly-linked chain of fixed-size blocks
//! (`BLOCK_DATA_SIZE` bytes each, except the last, which holds whatever
//! remains). [`Fs::resize_chain`] is the one place chain length changes: it
//! frees trailing blocks when shrinking, appends zero-filled blocks when
//! growing, and re-links/re-sizes whatever it keeps — `truncate`, and
//! `write`'s own growth, both go through it rather than duplicating the
//! walk.

use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::{AllocatorSupport, DirectorySupport, FileIoSupport, InodeSupport};
use mmapfs_api::types::{EntryKind, RawFileBlock, Timespec, FILE_BLOCK_SIZE};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes of user data held by every block in a chain except (possibly) the
/// last one.
const BLOCK_DATA_SIZE: u64 = 512;

struct ChainBlock {
    offset: u64,
    block: RawFileBlock,
}

/// Current wall-clock time as an on-image [`Timespec`], used to stamp
/// `mtime` on every mutation that isn't handed an explicit timestamp already
/// (only `utimens` is).
pub(crate) fn now() -> Timespec {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Timespec {
        sec: d.as_secs() as i64,
        nsec: d.subsec_nanos(),
    }
}

impl Fs {
    fn walk_chain(&self, first: u64) -> Result<Vec<ChainBlock>, FsError> {
        let mut out = Vec::new();
        let mut cur = first;
        while cur != 0 {
            let block: RawFileBlock = self.0.read_struct(cur, *FILE_BLOCK_SIZE)?;
            let next = block.next_offset;
            out.push(ChainBlock { offset: cur, block });
            cur = next;
        }
        Ok(out)
    }

    /// Free every block (data and header) in the chain starting at `first`.
    pub(crate) fn free_block_chain(&mut self, first: u64) -> Result<(), FsError> {
        let mut cur = first;
        while cur != 0 {
            let block: RawFileBlock = self.0.read_struct(cur, *FILE_BLOCK_SIZE)?;
            if block.data_offset != 0 {
                self.free(block.data_offset)?;
            }
            self.free(cur)?;
            cur = block.next_offset;
        }
        Ok(())
    }

    /// Free every block in `kept` past index `from` and truncate `kept` back
    /// to that length. Used when [`Self::resize_chain`]'s growth loop fails
    /// partway through: blocks it already allocated aren't linked into any
    /// inode yet (the caller only wires up `first_block_offset` once
    /// `resize_chain` returns `Ok`), so they'd otherwise leak.
    fn free_grown_blocks(&mut self, kept: &mut Vec<ChainBlock>, from: usize) -> Result<(), FsError> {
        for cb in kept.drain(from..) {
            if cb.block.data_offset != 0 {
                self.free(cb.block.data_offset)?;
            }
            self.free(cb.offset)?;
        }
        Ok(())
    }

    /// Resize the chain starting at `first` so it holds exactly `target_len`
    /// bytes of addressable content, returning the (possibly new) first
    /// block's offset (`0` if `target_len == 0`). Existing blocks that stay
    /// in range are left untouched except for their trailing link/size.
    fn resize_chain(&mut self, first: u64, target_len: u64) -> Result<u64, FsError> {
        let chain = self.walk_chain(first)?;
        let target_blocks = if target_len == 0 {
            0
        } else {
            ((target_len + BLOCK_DATA_SIZE - 1) / BLOCK_DATA_SIZE) as usize
        };

        for cb in chain.iter().skip(target_blocks) {
            if cb.block.data_offset != 0 {
                self.free(cb.block.data_offset)?;
            }
            self.free(cb.offset)?;
        }

        let grown_from = chain.len().min(target_blocks);
        let mut kept: Vec<ChainBlock> = chain.into_iter().take(target_blocks).collect();

        while kept.len() < target_blocks {
            let data_offset = self.allocate(BLOCK_DATA_SIZE)?;
            if data_offset == 0 {
                self.free_grown_blocks(&mut kept, grown_from)?;
                return Err(FsError::OutOfSpace);
            }
            self.0.zero(data_offset, BLOCK_DATA_SIZE)?;
            let meta_offset = self.allocate(*FILE_BLOCK_SIZE)?;
            if meta_offset == 0 {
                self.free(data_offset)?;
                self.free_grown_blocks(&mut kept, grown_from)?;
                return Err(FsError::OutOfSpace);
            }
            let new_block = RawFileBlock {
                size: 0,
                data_offset,
                next_offset: 0,
            };
            self.0.write_struct(meta_offset, *FILE_BLOCK_SIZE, &new_block)?;
            kept.push(ChainBlock {
                offset: meta_offset,
                block: new_block,
            });
        }

        let mut remaining = target_len;
        for i in 0..kept.len() {
            let this_size = remaining.min(BLOCK_DATA_SIZE);
            let next_offset = kept.get(i + 1).map(|n| n.offset).unwrap_or(0);
            let cb = &kept[i];
            if cb.block.size != this_size || cb.block.next_offset != next_offset {
                let updated = RawFileBlock {
                    size: this_size,
                    data_offset: cb.block.data_offset,
                    next_offset,
                };
                self.0.write_struct(cb.offset, *FILE_BLOCK_SIZE, &updated)?;
            }
            remaining = remaining.saturating_sub(BLOCK_DATA_SIZE);
        }

        Ok(kept.first().map(|cb| cb.offset).unwrap_or(0))
    }
}

impl FileIoSupport for Fs {
    fn truncate(&mut self, path: &str, n: u64) -> Result<(), FsError> {
        let (parent, _parent_offset, basename) = self.resolve_parent(path)?;
        let (child_offset, mut inode) =
            self.find_child(&parent, basename)?.ok_or(FsError::NotFound)?;
        if inode.kind == EntryKind::Directory {
            return Err(FsError::IsADirectory);
        }
        if inode.size == n {
            // Truncating to the current size is a no-op, not even touching mtime.
            return Ok(());
        }
        inode.first_block_offset = self.resize_chain(inode.first_block_offset, n)?;
        inode.size = n;
        inode.mtime = now();
        self.write_inode(child_offset, &inode)
    }

    fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<u64, FsError> {
        let inode = self.resolve(path)?;
        if inode.kind == EntryKind::Directory {
            return Err(FsError::IsADirectory);
        }
        if buf.is_empty() || offset >= inode.size {
            return Ok(0);
        }
        let end = (offset + buf.len() as u64).min(inode.size);
        let chain = self.walk_chain(inode.first_block_offset)?;
        let mut done = 0u64;
        let mut pos = offset;
        while pos < end {
            let index = (pos / BLOCK_DATA_SIZE) as usize;
            let cb = chain
                .get(index)
                .ok_or(FsError::BadState("file block chain shorter than recorded size"))?;
            let local_offset = pos % BLOCK_DATA_SIZE;
            let local_len = (BLOCK_DATA_SIZE - local_offset).min(end - pos);
            self.0.read_bytes(
                cb.block.data_offset + local_offset,
                &mut buf[done as usize..(done + local_len) as usize],
            )?;
            done += local_len;
            pos += local_len;
        }
        Ok(done)
    }

    fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<u64, FsError> {
        let (parent, _parent_offset, basename) = self.resolve_parent(path)?;
        let (child_offset, mut inode) =
            self.find_child(&parent, basename)?.ok_or(FsError::NotFound)?;
        if inode.kind == EntryKind::Directory {
            return Err(FsError::IsADirectory);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if offset > inode.size {
            // A write starting past the current end of file never fills the
            // gap; it is simply refused.
            return Ok(0);
        }

        let end = offset + buf.len() as u64;
        inode.first_block_offset = self.resize_chain(inode.first_block_offset, end.max(inode.size))?;

        let chain = self.walk_chain(inode.first_block_offset)?;
        let mut written = 0u64;
        let mut pos = offset;
        while written < buf.len() as u64 {
            let index = (pos / BLOCK_DATA_SIZE) as usize;
            let cb = &chain[index];
            let local_offset = pos % BLOCK_DATA_SIZE;
            let local_len = (BLOCK_DATA_SIZE - local_offset).min(buf.len() as u64 - written);
            self.0.write_bytes(
                cb.block.data_offset + local_offset,
                &buf[written as usize..(written + local_len) as usize],
            )?;
            written += local_len;
            pos += local_len;
        }

        inode.size = inode.size.max(end);
        inode.mtime = now();
        self.write_inode(child_offset, &inode)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmapfs_api::fs::DirectorySupport;
    use mmapfs_api::image::MappedImage;
    use std::fs::{create_dir_all, remove_dir_all};
    use std::path::PathBuf;

    fn disk_prep_path(name: &str) -> PathBuf {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("fs-images-fileio-".to_string() + name);
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
    fn write_then_read_round_trips() {
        with_fs("rw", 1 << 16, |fs| {
            fs.mknod("/a.txt").unwrap();
            let n = fs.write("/a.txt", b"hello, world", 0).unwrap();
            assert_eq!(n, 12);
            let mut buf = [0u8; 12];
            let r = fs.read("/a.txt", &mut buf, 0).unwrap();
            assert_eq!(r, 12);
            assert_eq!(&buf, b"hello, world");
        });
    }

    #[test]
    fn write_spanning_multiple_blocks() {
        with_fs("rw-multi", 1 << 20, |fs| {
            fs.mknod("/big.bin").unwrap();
            let data: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
            let n = fs.write("/big.bin", &data, 0).unwrap();
            assert_eq!(n as usize, data.len());
            let mut buf = vec![0u8; data.len()];
            let r = fs.read("/big.bin", &mut buf, 0).unwrap();
            assert_eq!(r as usize, data.len());
            assert_eq!(buf, data);
        });
    }

    #[test]
    fn write_past_eof_is_refused() {
        with_fs("rw-gap", 1 << 16, |fs| {
            fs.mknod("/a.txt").unwrap();
            let n = fs.write("/a.txt", b"xx", 100).unwrap();
            assert_eq!(n, 0);
        });
    }

    #[test]
    fn truncate_grows_with_zeros_and_shrinks_cleanly() {
        with_fs("trunc", 1 << 16, |fs| {
            fs.mknod("/a.txt").unwrap();
            fs.write("/a.txt", b"hi", 0).unwrap();
            fs.truncate("/a.txt", 10).unwrap();
            let mut buf = [0xffu8; 10];
            fs.read("/a.txt", &mut buf, 0).unwrap();
            assert_eq!(&buf[..2], b"hi");
            assert_eq!(&buf[2..], &[0u8; 8]);

            fs.truncate("/a.txt", 1).unwrap();
            let mut buf = [0u8; 1];
            fs.read("/a.txt", &mut buf, 0).unwrap();
            assert_eq!(&buf, b"h");
        });
    }

    #[test]
    fn truncate_to_current_size_is_a_no_op() {
        with_fs("trunc-noop", 1 << 16, |fs| {
            fs.mknod("/a.txt").unwrap();
            fs.write("/a.txt", b"hi", 0).unwrap();
            let before = fs.resolve("/a.txt").unwrap();
            fs.truncate("/a.txt", before.size).unwrap();
            let after = fs.resolve("/a.txt").unwrap();
            assert_eq!(before.mtime, after.mtime);
        });
    }
}

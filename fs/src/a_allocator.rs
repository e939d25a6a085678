//! Free-space allocation over the usable region.
//!
//! The free list is a sorted (address-ordered), singly-linked chain of
//! [`BlockHeader`]s threaded through the image itself, starting at
//! `header.free_head`. Allocation is first-fit: walk the list, take the
//! first block big enough, split it in place if the leftover is itself big
//! enough to host another `BlockHeader`, otherwise hand out the whole block
//! and accept a little internal slack. Freeing re-inserts in sorted order
//! and immediately coalesces with whichever neighbour(s) turn out to be
//! physically adjacent, so fragmentation never accumulates past what a
//! single allocate/free cycle can cause.

use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::AllocatorSupport;
use mmapfs_api::types::BlockHeader;

/// Round `n` up to the nearest multiple of 8, so every block's user payload
/// starts and ends on an alignment every on-image struct can tolerate.
fn align8(n: u64) -> u64 {
    (n + 7) & !7
}

impl Fs {
    /// Read the `BlockHeader` at absolute offset `block_offset`.
    fn read_block(&self, block_offset: u64) -> Result<BlockHeader, FsError> {
        Ok(self
            .0
            .read_struct(block_offset, *mmapfs_api::types::BLOCK_HEADER_SIZE)?)
    }

    /// Write a `BlockHeader` at absolute offset `block_offset`.
    fn write_block(&mut self, block_offset: u64, block: &BlockHeader) -> Result<(), FsError> {
        Ok(self
            .0
            .write_struct(block_offset, *mmapfs_api::types::BLOCK_HEADER_SIZE, block)?)
    }

    /// Point whatever currently points at the free-list slot identified by
    /// `prev_offset` (0 meaning "the header's `free_head` field") at
    /// `new_next` instead.
    fn relink(&mut self, prev_offset: u64, new_next: u64) -> Result<(), FsError> {
        if prev_offset == 0 {
            let mut header = self.0.header();
            header.free_head = new_next;
            self.0.set_header(&header);
        } else {
            let mut prev = self.read_block(prev_offset)?;
            prev.next = new_next;
            self.write_block(prev_offset, &prev)?;
        }
        Ok(())
    }
}

impl AllocatorSupport for Fs {
    type Error = FsError;

    fn allocate(&mut self, n: u64) -> Result<u64, FsError> {
        let header_size = *mmapfs_api::types::BLOCK_HEADER_SIZE;
        let needed = header_size
            .checked_add(align8(n))
            .ok_or(FsError::OutOfSpace)?;

        let mut prev_offset = 0u64;
        let mut cur = self.0.header().free_head;
        while cur != 0 {
            let block = self.read_block(cur)?;
            if block.size >= needed {
                let remaining = block.size - needed;
                if remaining >= header_size {
                    let tail_offset = cur + needed;
                    let tail = BlockHeader {
                        size: remaining,
                        next: block.next,
                    };
                    self.write_block(tail_offset, &tail)?;
                    self.relink(prev_offset, tail_offset)?;
                    self.write_block(
                        cur,
                        &BlockHeader {
                            size: needed,
                            next: 0,
                        },
                    )?;
                } else {
                    self.relink(prev_offset, block.next)?;
                    self.write_block(
                        cur,
                        &BlockHeader {
                            size: block.size,
                            next: 0,
                        },
                    )?;
                }
                return Ok(cur + header_size);
            }
            prev_offset = cur;
            cur = block.next;
        }
        log::trace!("allocate: no free block holds {} bytes, exhausted", needed);
        Ok(0)
    }

    fn free(&mut self, offset: u64) -> Result<(), FsError> {
        if offset == 0 {
            return Ok(());
        }
        let header_size = *mmapfs_api::types::BLOCK_HEADER_SIZE;
        let block_offset = offset - header_size;
        let mut block = self.read_block(block_offset)?;

        let mut prev_offset = 0u64;
        let mut next_offset = self.0.header().free_head;
        while next_offset != 0 && next_offset < block_offset {
            prev_offset = next_offset;
            next_offset = self.read_block(next_offset)?.next;
        }
        block.next = next_offset;

        if next_offset != 0 && block_offset + block.size == next_offset {
            let right = self.read_block(next_offset)?;
            log::debug!("free: coalescing block at {} with right neighbour at {}", block_offset, next_offset);
            block.size += right.size;
            block.next = right.next;
        }
        self.write_block(block_offset, &block)?;

        if prev_offset != 0 {
            let mut left = self.read_block(prev_offset)?;
            if prev_offset + left.size == block_offset {
                log::debug!("free: coalescing block at {} with left neighbour at {}", block_offset, prev_offset);
                left.size += block.size;
                left.next = block.next;
                self.write_block(prev_offset, &left)?;
                return Ok(());
            }
        }
        self.relink(prev_offset, block_offset)
    }

    fn reallocate(&mut self, offset: u64, n: u64) -> Result<u64, FsError> {
        if n == 0 {
            self.free(offset)?;
            return Ok(0);
        }
        let header_size = *mmapfs_api::types::BLOCK_HEADER_SIZE;
        let old_block_offset = offset - header_size;
        let old_user_size = self.read_block(old_block_offset)?.size - header_size;

        let new_offset = self.allocate(n)?;
        if new_offset == 0 {
            return Ok(0);
        }
        let copy_len = old_user_size.min(align8(n));
        if copy_len > 0 {
            self.0.copy_within(offset, new_offset, copy_len)?;
        }
        self.free(offset)?;
        Ok(new_offset)
    }

    fn largest_free_run(&self) -> u64 {
        let header_size = *mmapfs_api::types::BLOCK_HEADER_SIZE;
        let mut best = 0u64;
        let mut cur = self.0.header().free_head;
        while cur != 0 {
            let block = match self.read_block(cur) {
                Ok(b) => b,
                Err(_) => break,
            };
            best = best.max(block.size - header_size);
            cur = block.next;
        }
        best
    }

    fn total_free(&self) -> u64 {
        let mut total = 0u64;
        let mut cur = self.0.header().free_head;
        while cur != 0 {
            let block = match self.read_block(cur) {
                Ok(b) => b,
                Err(_) => break,
            };
            total += block.size;
            cur = block.next;
        }
        total
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
        path.push("fs-images-alloc-".to_string() + name);
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
    fn allocate_then_free_restores_original_capacity() {
        with_fs("roundtrip", 4096, |fs| {
            let original_run = fs.largest_free_run();
            let off = fs.allocate(64).unwrap();
            assert_ne!(off, 0);
            assert!(fs.largest_free_run() < original_run);
            fs.free(off).unwrap();
            assert_eq!(fs.largest_free_run(), original_run);
        });
    }

    #[test]
    fn exhaustion_returns_zero_not_error() {
        with_fs("exhaustion", 256, |fs| {
            let mut allocations = Vec::new();
            loop {
                let off = fs.allocate(16).unwrap();
                if off == 0 {
                    break;
                }
                allocations.push(off);
            }
            assert_eq!(fs.allocate(16).unwrap(), 0);
            for off in allocations {
                fs.free(off).unwrap();
            }
        });
    }

    #[test]
    fn adjacent_frees_coalesce_back_to_one_run() {
        with_fs("coalesce", 4096, |fs| {
            let original_run = fs.largest_free_run();
            let a = fs.allocate(32).unwrap();
            let b = fs.allocate(32).unwrap();
            let c = fs.allocate(32).unwrap();
            fs.free(b).unwrap();
            fs.free(a).unwrap();
            fs.free(c).unwrap();
            assert_eq!(fs.largest_free_run(), original_run);
        });
    }

    #[test]
    fn reallocate_preserves_content() {
        with_fs("realloc", 4096, |fs| {
            let off = fs.allocate(16).unwrap();
            fs.0.write_bytes(off, b"hello world12345").unwrap();
            let grown = fs.reallocate(off, 64).unwrap();
            assert_ne!(grown, 0);
            let mut buf = [0u8; 16];
            fs.0.read_bytes(grown, &mut buf).unwrap();
            assert_eq!(&buf, b"hello world12345");
        });
    }
}

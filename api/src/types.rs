//! On-image structure layouts.
//!
//! Every type in this module is (de)serialized with `bincode` directly into
//! the mapped byte region at a computed offset. Struct padding is not meant
//! to be stable across compilers or bincode versions — only a single running
//! implementation needs to agree with itself, since the image is never
//! shared across builds.

use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// Sentinel identifying an initialized image. Chosen to match the host
/// interface's documented magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Maximum number of bytes in a name, not counting the NUL terminator.
pub const NAME_MAX: usize = 255;

/// Size, in bytes, of the fixed name buffer stored inline in each inode
/// (`NAME_MAX` bytes of content plus one NUL terminator).
pub const NAME_SLOT: usize = NAME_MAX + 1;

/// Image header, always at offset 0.
///
/// `magic == MAGIC` iff the image has been initialized. The header
/// itself is never treated as a live entity, which is why offset 0 can
/// universally stand for "null".
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Sentinel identifying an initialized image.
    pub magic: u32,
    /// Usable bytes: region size minus the header's own on-image footprint.
    pub usable_size: u64,
    /// Absolute offset of the first free block, or 0 if the free list is
    /// empty. Absolute, so that 0 is never a live block — the header itself
    /// occupies `[0, HEADER_SIZE)`.
    pub free_head: u64,
    /// Absolute offset of the root directory inode, or 0 before first
    /// resolution.
    pub root_offset: u64,
}

lazy_static::lazy_static! {
    /// On-image size of [`Header`], computed once at first use.
    pub static ref HEADER_SIZE: u64 = bincode::serialize(&Header::default()).unwrap().len() as u64;
}

/// Header shared by every block on the free list and every allocated block,
/// so the two can coexist on one list once a block is freed.
///
/// For a free block, `size` is the block's total size (header inclusive) and
/// `next` is the offset of the next free block (0 if last). For an allocated
/// block, `size` is likewise the total size; `next` is unused and written as
/// 0 so that a freshly freed block never appears to point at stale data.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total size of this block, header inclusive.
    pub size: u64,
    /// Offset of the next free block, or 0. Unused (and zero) when allocated.
    pub next: u64,
}

lazy_static::lazy_static! {
    /// On-image size of [`BlockHeader`], computed once at first use.
    pub static ref BLOCK_HEADER_SIZE: u64 = bincode::serialize(&BlockHeader::default()).unwrap().len() as u64;
}

/// Discriminates the two kinds of inode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory inode; uses `child_count`/`children_offset`.
    Directory,
    /// A regular-file inode; uses `size`/`first_block_offset`.
    RegularFile,
}

impl Default for EntryKind {
    fn default() -> Self {
        EntryKind::RegularFile
    }
}

/// A POSIX-style `(seconds, nanoseconds)` timestamp, as stored on-image.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timespec {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nsec: u32,
}

/// On-image inode, stored inline inside its parent directory's children
/// array. Carries both directory-variant and regular-file-variant fields in
/// one flat struct rather than a tagged union, since the variant fields are
/// cheap and this keeps the struct `bincode`-friendly.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct RawInode {
    /// NUL-terminated name, up to [`NAME_MAX`] bytes of content.
    #[serde(with = "BigArray")]
    pub name: [u8; NAME_SLOT],
    /// Directory or regular file.
    pub kind: EntryKind,
    /// Last access time.
    pub atime: Timespec,
    /// Last modification time.
    pub mtime: Timespec,
    /// Directory variant: number of children in the children array.
    pub child_count: u64,
    /// Directory variant: offset of the contiguous children array, or 0.
    pub children_offset: u64,
    /// Regular-file variant: logical byte length.
    pub size: u64,
    /// Regular-file variant: offset of the first file block, or 0 if empty.
    pub first_block_offset: u64,
}

impl Default for RawInode {
    fn default() -> Self {
        RawInode {
            name: [0; NAME_SLOT],
            kind: EntryKind::RegularFile,
            atime: Timespec::default(),
            mtime: Timespec::default(),
            child_count: 0,
            children_offset: 0,
            size: 0,
            first_block_offset: 0,
        }
    }
}

lazy_static::lazy_static! {
    /// On-image size of [`RawInode`], computed once at first use.
    pub static ref INODE_SIZE: u64 = bincode::serialize(&RawInode::default()).unwrap().len() as u64;
}

/// A node in a regular file's singly-linked chain of file blocks.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawFileBlock {
    /// Bytes of user data held by this block.
    pub size: u64,
    /// Offset of this block's data payload, or 0 if `size == 0`.
    pub data_offset: u64,
    /// Offset of the next file block, or 0 if this is the last one.
    pub next_offset: u64,
}

lazy_static::lazy_static! {
    /// On-image size of [`RawFileBlock`], computed once at first use.
    pub static ref FILE_BLOCK_SIZE: u64 = bincode::serialize(&RawFileBlock::default()).unwrap().len() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_stable() {
        assert_eq!(*HEADER_SIZE, *HEADER_SIZE);
        assert!(*HEADER_SIZE >= 4 + 8 + 8 + 8);
    }

    #[test]
    fn inode_round_trips_through_bincode() {
        let mut ino = RawInode::default();
        ino.name[0] = b'a';
        ino.kind = EntryKind::Directory;
        ino.child_count = 3;
        let bytes = bincode::serialize(&ino).unwrap();
        let back: RawInode = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.name[0], b'a');
        assert_eq!(back.kind, EntryKind::Directory);
        assert_eq!(back.child_count, 3);
    }
}

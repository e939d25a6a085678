//! Layered traits implemented by the `mmapfs` crate for [`crate::image::Handle`].
//!
//! Each trait builds on the previous one: allocator, then inode/path
//! resolution, then directory mutation, then file content, then the
//! miscellaneous attribute operations.

use crate::image::Handle;
use crate::types::{RawFileBlock, RawInode};
use std::error;

/// Free-space allocation over the usable region.
pub trait AllocatorSupport {
    /// The error type produced by this layer and everything built on it.
    type Error: error::Error;

    /// Reserve at least `n` user bytes. Returns the offset of the user data
    /// (just past the allocation's own header), or `0` on exhaustion.
    fn allocate(&mut self, n: u64) -> Result<u64, Self::Error>;

    /// Release a previously allocated block.
    fn free(&mut self, offset: u64) -> Result<(), Self::Error>;

    /// Allocate fresh, copy up to `min(old_user_size, n)` bytes over, then
    /// free the old allocation. `n == 0` is equivalent to [`Self::free`] and
    /// returns 0.
    fn reallocate(&mut self, offset: u64, n: u64) -> Result<u64, Self::Error>;

    /// Largest single user-visible size currently allocatable.
    fn largest_free_run(&self) -> u64;

    /// Sum of free-list block sizes (header inclusive).
    fn total_free(&self) -> u64;
}

/// Inode access and path resolution.
pub trait InodeSupport: AllocatorSupport {
    /// Root inode, creating it (as an empty directory) if absent.
    fn root(&mut self) -> Result<RawInode, Self::Error>;

    /// Resolve `path` to the inode it names. Never mutates the image, except
    /// for lazily creating the root inode when `path == "/"`.
    fn resolve(&mut self, path: &str) -> Result<RawInode, Self::Error>;

    /// Resolve `path` to `(parent inode, parent offset, basename)`. The
    /// basename is not required to already exist in the parent.
    fn resolve_parent<'a>(
        &mut self,
        path: &'a str,
    ) -> Result<(RawInode, u64, &'a str), Self::Error>;
}

/// Directory entry creation, removal, and renaming.
pub trait DirectorySupport: InodeSupport {
    /// Create an empty regular file at `path`.
    fn mknod(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Create an empty directory at `path`.
    fn mkdir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Remove the regular file at `path`, freeing its block chain.
    fn unlink(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Remove the empty directory at `path`.
    fn rmdir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Rename/move `from` to `to`.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error>;
}

/// Byte-level file content operations.
pub trait FileIoSupport: DirectorySupport {
    /// Grow or shrink the file at `path` to exactly `n` bytes.
    fn truncate(&mut self, path: &str, n: u64) -> Result<(), Self::Error>;

    /// Read up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes delivered (0 at or past end of file).
    fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<u64, Self::Error>;

    /// Write `buf` starting at `offset`. Returns the number of bytes written.
    fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<u64, Self::Error>;
}

/// Timestamp, directory listing, and filesystem-wide stats.
pub trait AttrSupport: FileIoSupport {
    /// Names of `path`'s children, excluding `.`/`..` (neither of which
    /// exists at this layer — there is no notion of a parent back-reference).
    fn readdir(&mut self, path: &str) -> Result<Vec<String>, Self::Error>;

    /// Set `atime`/`mtime` on the inode at `path`.
    fn utimens(
        &mut self,
        path: &str,
        atime: crate::types::Timespec,
        mtime: crate::types::Timespec,
    ) -> Result<(), Self::Error>;

    /// Block size, block counts, and name maximum for `statfs`.
    fn statfs(&self) -> StatFs;
}

/// Result of a `statfs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    /// Block size used for the block-count fields below.
    pub block_size: u64,
    /// Total blocks in the usable region.
    pub blocks: u64,
    /// Free blocks, derived from [`AllocatorSupport::total_free`].
    pub blocks_free: u64,
    /// Blocks available to unprivileged callers (same as `blocks_free` here,
    /// since access control is not enforced).
    pub blocks_available: u64,
    /// Maximum name length.
    pub name_max: u64,
}

/// A file block in a chain, paired with the offset of its own on-image
/// header so callers can walk, splice, or free it without a second lookup.
#[derive(Debug, Clone, Copy)]
pub struct FileBlockRef {
    /// Offset of this block's own `RawFileBlock` header.
    pub offset: u64,
    /// The block's fields.
    pub block: RawFileBlock,
}

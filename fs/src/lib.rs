//! Implementation of an in-memory, offset-addressed POSIX-style filesystem
//! living inside a single mapped byte region.
//!
//! [`Fs`] wraps a [`mmapfs_api::image::Handle`]; a single wrapper carries
//! every layer, since none of them need extra Rust-side state beyond what
//! already lives in the on-image header: free list head and root offset are
//! both read from, and written back to, the image itself on every call,
//! never cached in `Fs`.
//!
//! The layers are still split across files, purely for readability:
//! - [`a_allocator`]: free-space allocation
//! - [`b_inode`]: inode access and path resolution
//! - [`c_path`]: path parsing helpers
//! - [`d_dirops`]: directory mutation
//! - [`e_fileio`]: file content operations
//! - [`g_stat`]: attribute/stat operations
//! - [`f_host`]: the thirteen host-facing entry points

#![deny(missing_docs)]

use mmapfs_api::fs::AllocatorSupport;
use mmapfs_api::image::Handle;
use mmapfs_api::types::{EntryKind, RawInode, INODE_SIZE};

pub mod a_allocator;
pub mod b_inode;
pub mod c_path;
pub mod d_dirops;
pub mod e_fileio;
pub mod error;
pub mod f_host;
pub mod g_stat;

/// The filesystem, wrapping a single per-call [`Handle`].
///
/// Never outlives the call that created it (see [`Handle::acquire`]); every
/// host-facing entry point in [`f_host`] constructs one from `(fsptr,
/// fssize)`, uses it, and drops it before returning.
pub struct Fs(
    /// The underlying per-call handle.
    pub Handle,
);

impl Fs {
    /// Acquire a filesystem view over `[fsptr, fsptr + fssize)`.
    ///
    /// Creates the root directory inode eagerly if the header does not yet
    /// reference one (`root_offset == 0`), rather than deferring it to first
    /// path resolution: this keeps `root_offset == 0` an unambiguous "not
    /// created yet" signal that never needs to be rechecked once a caller has
    /// successfully resolved anything at all.
    ///
    /// # Safety
    /// Same contract as [`Handle::acquire`].
    pub unsafe fn acquire(fsptr: *mut u8, fssize: usize) -> error::Result<Fs> {
        let mut fs = Fs(Handle::acquire(fsptr, fssize)?);
        if fs.0.header().root_offset == 0 {
            fs.create_root()?;
        }
        Ok(fs)
    }

    fn create_root(&mut self) -> error::Result<()> {
        let offset = self.allocate(*INODE_SIZE)?;
        if offset == 0 {
            return Err(error::FsError::OutOfSpace);
        }
        let root = RawInode {
            kind: EntryKind::Directory,
            ..RawInode::default()
        };
        self.0.write_struct(offset, *INODE_SIZE, &root)?;
        let mut header = self.0.header();
        header.root_offset = offset;
        self.0.set_header(&header);
        Ok(())
    }
}

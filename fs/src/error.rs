//! `mmapfs`'s error type, layered over [`mmapfs_api::error::ImgError`].

use mmapfs_api::error::ImgError;
use thiserror::Error;

/// The filesystem-level error kinds.
#[derive(Error, Debug)]
pub enum FsError {
    /// Image not initialized or internally inconsistent.
    #[error("image is in a bad state: {0}")]
    BadState(&'static str),

    /// A path component does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// The target of a creation already exists.
    #[error("already exists")]
    Exists,

    /// Expected a regular file, found a directory.
    #[error("is a directory")]
    IsADirectory,

    /// Expected a directory, found a regular file (or vice versa mid-path).
    #[error("not a directory")]
    NotADirectory,

    /// `rmdir` on a directory that still has children.
    #[error("directory not empty")]
    NotEmpty,

    /// A path component exceeds `NAME_MAX`.
    #[error("name too long")]
    NameTooLong,

    /// The allocator could not satisfy a required allocation.
    #[error("out of space")]
    OutOfSpace,

    /// A host-side allocation (e.g. for `readdir`'s name list) failed.
    #[error("host out of memory")]
    HostOutOfMemory,

    /// Failure from the image layer underneath.
    #[error("image layer error")]
    Image(#[from] ImgError),
}

/// Generic alias for a `Result` with the error type [`FsError`].
pub type Result<T> = std::result::Result<T, FsError>;

/// POSIX errno values used by the host-facing entry points. Kept as plain constants (not
/// the `libc` crate) since this workspace otherwise has no FFI dependency and
/// every caller of [`FsError::errno`] just wants an `i32` to stash in its own
/// `errno_out` slot.
pub mod errno {
    /// Bad image state.
    pub const EFAULT: i32 = 14;
    /// No such file or directory.
    pub const ENOENT: i32 = 2;
    /// File exists.
    pub const EEXIST: i32 = 17;
    /// Directory not empty.
    pub const ENOTEMPTY: i32 = 39;
    /// Is a directory.
    pub const EISDIR: i32 = 21;
    /// Not a directory.
    pub const ENOTDIR: i32 = 20;
    /// Filename too long.
    pub const ENAMETOOLONG: i32 = 36;
    /// Out of memory (image full, or host scratch allocation failed).
    pub const ENOMEM: i32 = 12;
}

impl FsError {
    /// Map this error to the POSIX errno it corresponds to.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::BadState(_) => errno::EFAULT,
            FsError::NotFound => errno::ENOENT,
            FsError::Exists => errno::EEXIST,
            FsError::IsADirectory => errno::EISDIR,
            FsError::NotADirectory => errno::ENOTDIR,
            FsError::NotEmpty => errno::ENOTEMPTY,
            FsError::NameTooLong => errno::ENAMETOOLONG,
            FsError::OutOfSpace => errno::ENOMEM,
            FsError::HostOutOfMemory => errno::ENOMEM,
            FsError::Image(_) => errno::EFAULT,
        }
    }
}

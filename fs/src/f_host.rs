//! The thirteen host-facing entry points.
//!
//! Each one takes `(fsptr, fssize, errno_out, ...)`, exactly the shape a
//! FUSE-style driver written in another language links against: no
//! descriptor table, no open files carried between calls, just a region and
//! an offset into it that might move on every single call. Every entry point
//! re-acquires a fresh [`Fs`] from `(fsptr, fssize)` and drops it before
//! returning, matching a single-client, call-serialized concurrency model.
//!
//! Internally these are thin adapters over the safe, `Result`-returning
//! trait methods implemented across `a_allocator`..`g_stat`; nothing here
//! re-implements filesystem logic, it only translates between raw pointers
//! and `errno_out` on one side and `&str`/`Result<_, FsError>` on the other.

use crate::error::FsError;
use crate::Fs;
use mmapfs_api::fs::{AttrSupport, DirectorySupport, FileIoSupport};
use mmapfs_api::types::{RawInode, Timespec};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

unsafe fn path_str<'a>(path: *const c_char) -> Result<&'a str, FsError> {
    if path.is_null() {
        return Err(FsError::BadState("null path pointer"));
    }
    CStr::from_ptr(path)
        .to_str()
        .map_err(|_| FsError::BadState("path is not valid UTF-8"))
}

/// Acquire a filesystem view, run `f`, and translate a `FsError` into
/// `*errno_out`. Returns `None` on failure (errno already set), `Some(v)` on
/// success.
unsafe fn with_fs<R>(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    f: impl FnOnce(&mut Fs) -> Result<R, FsError>,
) -> Option<R> {
    let mut fs = match Fs::acquire(fsptr, fssize) {
        Ok(fs) => fs,
        Err(e) => {
            if !errno_out.is_null() {
                *errno_out = e.errno();
            }
            return None;
        }
    };
    match f(&mut fs) {
        Ok(v) => Some(v),
        Err(e) => {
            if !errno_out.is_null() {
                *errno_out = e.errno();
            }
            None
        }
    }
}

/// `getattr(path)`: fill `*stat_out` with the inode named by `path`.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_getattr(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    stat_out: *mut RawInode,
) -> i32 {
    let inode = with_fs(fsptr, fssize, errno_out, |fs| {
        let path = path_str(path)?;
        fs.getattr(path)
    });
    match inode {
        Some(inode) => {
            if !stat_out.is_null() {
                *stat_out = inode;
            }
            0
        }
        None => -1,
    }
}

/// `readdir(path)`: allocate a NUL-terminated, null-pointer-terminated array
/// of child names at `*names_out`, returning the child count or `-1`. Free
/// the result with [`mmapfs_free_dirlist`].
#[no_mangle]
pub unsafe extern "C" fn mmapfs_readdir(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    names_out: *mut *mut *mut c_char,
) -> i32 {
    let names = with_fs(fsptr, fssize, errno_out, |fs| {
        let path = path_str(path)?;
        fs.readdir(path)
    });
    let names = match names {
        Some(n) => n,
        None => return -1,
    };
    let count = names.len();
    let mut raw: Vec<*mut c_char> = names
        .into_iter()
        .map(|name| {
            CString::new(name)
                .unwrap_or_else(|_| CString::new("").unwrap())
                .into_raw()
        })
        .collect();
    raw.push(std::ptr::null_mut());
    let ptr = raw.as_mut_ptr();
    std::mem::forget(raw);
    if !names_out.is_null() {
        *names_out = ptr;
    }
    count as i32
}

/// Free an array previously returned through `names_out` by
/// [`mmapfs_readdir`].
#[no_mangle]
pub unsafe extern "C" fn mmapfs_free_dirlist(names: *mut *mut c_char) {
    if names.is_null() {
        return;
    }
    let mut len = 0usize;
    while !(*names.add(len)).is_null() {
        drop(CString::from_raw(*names.add(len)));
        len += 1;
    }
    drop(Vec::from_raw_parts(names, len + 1, len + 1));
}

/// `mknod(path)`: create an empty regular file.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_mknod(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
) -> i32 {
    match with_fs(fsptr, fssize, errno_out, |fs| fs.mknod(path_str(path)?)) {
        Some(()) => 0,
        None => -1,
    }
}

/// `unlink(path)`: remove a regular file.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_unlink(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
) -> i32 {
    match with_fs(fsptr, fssize, errno_out, |fs| fs.unlink(path_str(path)?)) {
        Some(()) => 0,
        None => -1,
    }
}

/// `mkdir(path)`: create an empty directory.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_mkdir(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
) -> i32 {
    match with_fs(fsptr, fssize, errno_out, |fs| fs.mkdir(path_str(path)?)) {
        Some(()) => 0,
        None => -1,
    }
}

/// `rmdir(path)`: remove an empty directory.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_rmdir(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
) -> i32 {
    match with_fs(fsptr, fssize, errno_out, |fs| fs.rmdir(path_str(path)?)) {
        Some(()) => 0,
        None => -1,
    }
}

/// `rename(from, to)`: move/rename an entry, overwriting any pre-existing
/// entry already at `to`.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_rename(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    from: *const c_char,
    to: *const c_char,
) -> i32 {
    let result = with_fs(fsptr, fssize, errno_out, |fs| {
        fs.rename(path_str(from)?, path_str(to)?)
    });
    match result {
        Some(()) => 0,
        None => -1,
    }
}

/// `truncate(path, size)`: grow or shrink a regular file to exactly `size`
/// bytes.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_truncate(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    size: u64,
) -> i32 {
    let result = with_fs(fsptr, fssize, errno_out, |fs| {
        fs.truncate(path_str(path)?, size)
    });
    match result {
        Some(()) => 0,
        None => -1,
    }
}

/// `open(path)`: validate that `path` names an existing regular file. There
/// is no descriptor to hand back — every later `read`/`write` re-resolves
/// `path`.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_open(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
) -> i32 {
    match with_fs(fsptr, fssize, errno_out, |fs| fs.open(path_str(path)?)) {
        Some(()) => 0,
        None => -1,
    }
}

/// `read(path, buf, size, offset)`: deliver up to `size` bytes from `offset`
/// into `buf`, returning the number of bytes actually written to `buf`.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_read(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    buf: *mut u8,
    size: usize,
    offset: u64,
) -> i64 {
    if buf.is_null() {
        if !errno_out.is_null() {
            *errno_out = crate::error::errno::EFAULT;
        }
        return -1;
    }
    let slice = std::slice::from_raw_parts_mut(buf, size);
    let result = with_fs(fsptr, fssize, errno_out, |fs| {
        fs.read(path_str(path)?, slice, offset)
    });
    match result {
        Some(n) => n as i64,
        None => -1,
    }
}

/// `write(path, buf, size, offset)`: write `size` bytes from `buf` starting
/// at `offset`, returning the number of bytes actually written.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_write(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    buf: *const u8,
    size: usize,
    offset: u64,
) -> i64 {
    if buf.is_null() {
        if !errno_out.is_null() {
            *errno_out = crate::error::errno::EFAULT;
        }
        return -1;
    }
    let slice = std::slice::from_raw_parts(buf, size);
    let result = with_fs(fsptr, fssize, errno_out, |fs| {
        fs.write(path_str(path)?, slice, offset)
    });
    match result {
        Some(n) => n as i64,
        None => -1,
    }
}

/// `utimens(path, times)`: set `atime`/`mtime` from `times[0]`/`times[1]`.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_utimens(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    path: *const c_char,
    times: *const Timespec,
) -> i32 {
    if times.is_null() {
        if !errno_out.is_null() {
            *errno_out = crate::error::errno::EFAULT;
        }
        return -1;
    }
    let atime = *times;
    let mtime = *times.add(1);
    let result = with_fs(fsptr, fssize, errno_out, |fs| {
        fs.utimens(path_str(path)?, atime, mtime)
    });
    match result {
        Some(()) => 0,
        None => -1,
    }
}

/// `statfs()`: fill `*stat_out` with filesystem-wide statistics.
#[no_mangle]
pub unsafe extern "C" fn mmapfs_statfs(
    fsptr: *mut u8,
    fssize: usize,
    errno_out: *mut i32,
    stat_out: *mut mmapfs_api::fs::StatFs,
) -> i32 {
    let stats = with_fs(fsptr, fssize, errno_out, |fs| Ok(fs.statfs()));
    match stats {
        Some(stats) => {
            if !stat_out.is_null() {
                *stat_out = stats;
            }
            0
        }
        None => -1,
    }
}

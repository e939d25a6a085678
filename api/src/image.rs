//! The memory-mapped region and the transient handle over it.
//!
//! [`MappedImage`] is the thing that actually owns a memory-mapped file; the
//! unit of access here is "the whole region", not individual fixed-size
//! blocks. No provisions are made to lock the backing file against
//! concurrent mounts: fiddling with it while mounted is undefined behaviour,
//! by contract.
//!
//! [`Handle`] is a non-persistent, per-call descriptor: a base pointer, a
//! usable size, and nothing else. It is derived in O(1) from `(fsptr,
//! fssize)` on every call and must not be retained past the call that
//! created it, because the image may reappear at a different base address on
//! remount.

use crate::error::{ImgError, Result};
use crate::types::{Header, HEADER_SIZE, MAGIC};
use memmap::MmapMut;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Owns a memory-mapped file used to back an image during tests or by a
/// standalone driver. Not part of the core's contract — the core never
/// retains one of these across calls, only the raw `(fsptr, fssize)` pair it
/// exposes.
#[derive(Debug)]
pub struct MappedImage {
    path: PathBuf,
    mmap: MmapMut,
}

impl MappedImage {
    /// Create a new, `size`-byte backing file at `path` and memory-map it.
    /// The file is extended to `size` with the intervening bytes 0-filled,
    /// which is exactly the "all zero" starting state [`Handle::acquire`]
    /// recognizes as uninitialized.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<MappedImage> {
        let path_buf = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path_buf)?;
        file.set_len(size)?;
        let mmap = unsafe { memmap::MmapOptions::new().map_mut(&file)? };
        Ok(MappedImage {
            path: path_buf,
            mmap,
        })
    }

    /// Memory-map an existing backing file at `path`, keeping whatever image
    /// it already holds.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MappedImage> {
        let path_buf = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path_buf)?;
        let mmap = unsafe { memmap::MmapOptions::new().map_mut(&file)? };
        Ok(MappedImage {
            path: path_buf,
            mmap,
        })
    }

    /// Base pointer of the mapped region.
    pub fn fsptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// Size, in bytes, of the mapped region.
    pub fn fssize(&self) -> usize {
        self.mmap.len()
    }

    /// Flush any pending writes to the backing file.
    pub fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Path of the file backing this image.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A transient, per-call bundle of base pointer and usable size, plus the
/// logic needed to read and write on-image structures safely.
///
/// Never persist a `Handle` across operations: the whole point of storing
/// every reference as an offset rather than a pointer is that a `Handle` can
/// be thrown away and rebuilt from `(fsptr, fssize)` after the region has
/// been remapped to a new base address.
pub struct Handle {
    base: *mut u8,
    /// Usable bytes, i.e. the region size minus the header's footprint.
    usable_size: u64,
}

impl Handle {
    /// Acquire a handle over `[fsptr, fsptr + fssize)`.
    ///
    /// If `fssize` is too small to hold a [`Header`], fails with
    /// [`ImgError::RegionTooSmall`]. If the header's `magic` does not match
    /// [`MAGIC`], the region is treated as fresh: the bytes past the header
    /// are zeroed, a header is installed, and a single free block covering
    /// all usable bytes is created. Otherwise the existing header is trusted
    /// as-is.
    ///
    /// # Safety
    /// `fsptr` must point to at least `fssize` valid, writable bytes for the
    /// lifetime of the returned `Handle`, and no other `Handle` may alias the
    /// same bytes concurrently (the host is expected to serialize calls).
    pub unsafe fn acquire(fsptr: *mut u8, fssize: usize) -> Result<Handle> {
        if (fssize as u64) < *HEADER_SIZE {
            return Err(ImgError::RegionTooSmall(
                "region smaller than the image header",
            ));
        }
        let mut handle = Handle {
            base: fsptr,
            usable_size: fssize as u64 - *HEADER_SIZE,
        };
        let header = handle.read_header_raw()?;
        if header.magic != MAGIC {
            log::debug!("image magic mismatch, (re)initializing a fresh image");
            handle.zero(*HEADER_SIZE, handle.usable_size)?;
            let fresh = Header {
                magic: MAGIC,
                usable_size: handle.usable_size,
                free_head: 0,
                root_offset: 0,
            };
            handle.write_header_raw(&fresh)?;
            if handle.usable_size > 0 {
                let free_offset = *HEADER_SIZE;
                let free = crate::types::BlockHeader {
                    size: handle.usable_size,
                    next: 0,
                };
                handle.write_struct(free_offset, *crate::types::BLOCK_HEADER_SIZE, &free)?;
                let mut h = handle.read_header_raw()?;
                h.free_head = free_offset;
                handle.write_header_raw(&h)?;
            }
        } else {
            log::trace!("image already initialized, trusting existing header");
        }
        Ok(handle)
    }

    /// Raw bytes `[0, HEADER_SIZE)` at the very base of the region. Offsets
    /// used everywhere else in this module (and by every layer above it) are
    /// absolute, counted from this same base — which is exactly why offset 0
    /// can universally stand for "null": the header owns it and nothing else
    /// ever will.
    fn header_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base, *HEADER_SIZE as usize) }
    }

    fn header_slice_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.base, *HEADER_SIZE as usize) }
    }

    fn read_header_raw(&self) -> Result<Header> {
        Ok(bincode::deserialize(self.header_slice())?)
    }

    fn write_header_raw(&mut self, header: &Header) -> Result<()> {
        let encoded = bincode::serialize(header)?;
        self.header_slice_mut()[..encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    /// Current image header.
    pub fn header(&self) -> Header {
        self.read_header_raw()
            .expect("header was already validated by Handle::acquire")
    }

    /// Persist a new image header.
    pub fn set_header(&mut self, header: &Header) {
        self.write_header_raw(header)
            .expect("header region was already validated by Handle::acquire")
    }

    /// Usable bytes available for allocation (the region size minus the
    /// header's own footprint).
    pub fn usable_size(&self) -> u64 {
        self.usable_size
    }

    /// Convert an absolute offset into a byte slice of `len` bytes at that
    /// offset. `offset` must fall at or past `HEADER_SIZE`: nothing above
    /// this layer may address the header itself through this path.
    fn raw_slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        self.check_bounds(offset, len)?;
        Ok(unsafe { std::slice::from_raw_parts(self.base.add(offset as usize), len as usize) })
    }

    fn raw_slice_mut(&mut self, offset: u64, len: u64) -> Result<&mut [u8]> {
        self.check_bounds(offset, len)?;
        Ok(unsafe {
            std::slice::from_raw_parts_mut(self.base.add(offset as usize), len as usize)
        })
    }

    fn check_bounds(&self, offset: u64, len: u64) -> Result<()> {
        if offset < *HEADER_SIZE {
            return Err(ImgError::OffsetOutOfBounds(
                "offset falls inside the reserved header",
            ));
        }
        let end = offset
            .checked_add(len)
            .ok_or(ImgError::ArithmeticOverflow("offset + len overflowed"))?;
        if end > *HEADER_SIZE + self.usable_size {
            return Err(ImgError::OffsetOutOfBounds(
                "access falls outside the usable region",
            ));
        }
        Ok(())
    }

    /// Read `len` raw bytes starting at absolute `offset` into `buf`.
    pub fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let src = self.raw_slice(offset, buf.len() as u64)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    /// Write `buf` at absolute `offset`.
    pub fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let dst = self.raw_slice_mut(offset, buf.len() as u64)?;
        dst.copy_from_slice(buf);
        Ok(())
    }

    /// Zero `len` bytes starting at absolute `offset`.
    pub fn zero(&mut self, offset: u64, len: u64) -> Result<()> {
        let dst = self.raw_slice_mut(offset, len)?;
        for b in dst.iter_mut() {
            *b = 0;
        }
        Ok(())
    }

    /// Move `len` bytes from absolute offset `src` to absolute offset `dst`.
    /// Used by the compact-with-last-slot removal technique, where source and
    /// destination ranges may overlap.
    pub fn copy_within(&mut self, src: u64, dst: u64, len: u64) -> Result<()> {
        self.check_bounds(src, len)?;
        self.check_bounds(dst, len)?;
        let total = (*HEADER_SIZE + self.usable_size) as usize;
        let whole = unsafe { std::slice::from_raw_parts_mut(self.base, total) };
        whole.copy_within(src as usize..(src + len) as usize, dst as usize);
        Ok(())
    }

    /// Read a `bincode`-encoded structure of type `T` from `offset`.
    pub fn read_struct<T: DeserializeOwned>(&self, offset: u64, size: u64) -> Result<T> {
        let bytes = self.raw_slice(offset, size)?;
        Ok(bincode::deserialize(bytes)?)
    }

    /// Write `value`, `bincode`-encoded, at `offset`. `size` must be at least
    /// as large as the encoded form (the usual case: the caller passes the
    /// precomputed `lazy_static` size for `T`).
    pub fn write_struct<T: Serialize>(&mut self, offset: u64, size: u64, value: &T) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        if encoded.len() as u64 > size {
            return Err(ImgError::ArithmeticOverflow(
                "encoded structure larger than its reserved slot",
            ));
        }
        let dst = self.raw_slice_mut(offset, size)?;
        dst[..encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }
}

//! Foundation crate for the image filesystem.
//!
//! This crate is the stable contract the `mmapfs` crate builds on: the
//! on-image struct layouts, the `Handle` abstraction over a raw byte region,
//! the error type, and the layered traits that `mmapfs` implements for
//! `Handle`.
//!
//! The next thing to look at is the [`image`] module, which defines
//! [`image::Handle`], the non-persistent per-call descriptor every operation
//! starts from.

#![deny(missing_docs)]

pub mod error;
pub mod image;
pub mod fs;
pub mod types;

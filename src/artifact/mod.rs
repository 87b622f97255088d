//! Builders for the artifacts that end up in (or around) the ISO.
//!
//! - [`filesystem`] - copies into the staging tree, atomic moves
//! - [`minimize`] - resparse and the `osmin.img` delta image
//! - [`squashfs`] - `LiveOS/squashfs.img` (mksquashfs)
//! - [`iso`] - genisoimage, isohybrid and implantisomd5
//! - [`package`] - optional tar/tar.zst wrapper around the ISO
//! - [`checksum`] - SHA-256 sidecar files

pub mod checksum;
pub mod filesystem;
pub mod iso;
pub mod minimize;
pub mod package;
pub mod squashfs;

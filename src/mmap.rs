// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cmp::min;
use std::mem::size_of;
use std::ptr::copy_nonoverlapping;
use std::ptr::read_unaligned;
use std::ptr::write_unaligned;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;

use crate::identity::checked_range_end;
use crate::platform::MemoryMapping as PlatformMmap;
use crate::MemoryLayout;
use crate::Mode;
use crate::SharedMemoryRegion;

#[sorted]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("requested memory out of range")]
    InvalidAddress,
    #[error("invalid argument provided when creating mapping")]
    InvalidArgument,
    #[error("requested offset is out of range of off_t")]
    InvalidOffset,
    #[error("requested memory range spans past the end of the region: offset={0} count={1} region_size={2}")]
    InvalidRange(usize, usize, usize),
    #[error("cannot map an invalid shared memory region")]
    InvalidRegion,
    #[error("mapping is not writable")]
    NotWritable,
    #[error("mmap related system call failed: {0}")]
    SystemCallFailed(#[source] crate::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Memory access type for shared memory mapping.
#[derive(Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct Protection {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Protection {
    /// Returns Protection allowing read/write access.
    #[inline(always)]
    pub fn read_write() -> Protection {
        Protection {
            read: true,
            write: true,
        }
    }

    /// Returns Protection allowing read access.
    #[inline(always)]
    pub fn read() -> Protection {
        Protection {
            read: true,
            ..Default::default()
        }
    }

    /// The protection a mapping of a region in `mode` gets.
    #[inline(always)]
    pub fn for_mode(mode: Mode) -> Protection {
        match mode {
            Mode::ReadOnly => Protection::read(),
            Mode::Writable | Mode::Unsafe => Protection::read_write(),
        }
    }
}

/// A view of part of a [`SharedMemoryRegion`] mapped into this process. Unmapped on drop.
///
/// The OS mapping starts at the allocation granularity boundary at or below the requested offset;
/// only the requested window is exposed.
#[derive(Debug)]
pub struct MemoryMapping {
    mapping: PlatformMmap,
    view_offset: usize,
    size: usize,
    protection: Protection,
}

impl MemoryMapping {
    /// Pointer to the first byte of the requested window.
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY:
        // `view_offset` is within the platform mapping, see `MemoryMappingBuilder::build`.
        unsafe { self.mapping.as_ptr().add(self.view_offset) }
    }

    /// Size of the requested window in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn write_slice(&self, buf: &[u8], offset: usize) -> Result<usize> {
        if !self.protection.write {
            return Err(Error::NotWritable);
        }
        match self.size.checked_sub(offset) {
            Some(size_past_offset) => {
                let bytes_copied = min(size_past_offset, buf.len());
                // SAFETY:
                // The bytes_copied equation above ensures we don't copy bytes out of range of
                // either buf or this mapping. The buffers cannot overlap because `buf` is a Rust
                // slice and this memory is only reachable through raw pointers.
                unsafe {
                    copy_nonoverlapping(buf.as_ptr(), self.as_ptr().add(offset), bytes_copied);
                }
                Ok(bytes_copied)
            }
            None => Err(Error::InvalidAddress),
        }
    }

    pub fn read_slice(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        match self.size.checked_sub(offset) {
            Some(size_past_offset) => {
                let bytes_copied = min(size_past_offset, buf.len());
                // SAFETY:
                // The bytes_copied equation above ensures we don't copy bytes out of range of
                // either buf or this mapping.
                unsafe {
                    copy_nonoverlapping(self.as_ptr().add(offset), buf.as_mut_ptr(), bytes_copied);
                }
                Ok(bytes_copied)
            }
            None => Err(Error::InvalidAddress),
        }
    }

    /// Writes an object to the mapping at the specified offset.
    /// Returns Ok(()) if the object fits, or Err if it extends past the end.
    pub fn write_obj<T: IntoBytes + Immutable>(&self, val: T, offset: usize) -> Result<()> {
        if !self.protection.write {
            return Err(Error::NotWritable);
        }
        checked_range_end(offset, size_of::<T>(), self.size).ok_or(Error::InvalidAddress)?;
        // SAFETY:
        // This is safe because we checked the bounds above.
        unsafe {
            write_unaligned(self.as_ptr().add(offset) as *mut T, val);
        }
        Ok(())
    }

    /// Reads an object from the mapping at the given offset.
    /// Another process may be writing the same memory, so `T` must accept any bit pattern.
    pub fn read_obj<T: FromBytes>(&self, offset: usize) -> Result<T> {
        checked_range_end(offset, size_of::<T>(), self.size).ok_or(Error::InvalidAddress)?;
        // SAFETY:
        // This is safe because we checked the bounds above and `T: FromBytes` is valid for any
        // bit pattern.
        unsafe { Ok(read_unaligned(self.as_ptr().add(offset) as *const T)) }
    }
}

pub struct MemoryMappingBuilder<'a> {
    region: Option<&'a SharedMemoryRegion>,
    size: usize,
    offset: usize,
    layout: Option<MemoryLayout>,
}

/// Builds a MemoryMapping of a region, checking the requested window against the region's size.
impl<'a> MemoryMappingBuilder<'a> {
    /// Creates a new builder for a mapping of `size` bytes.
    pub fn new(size: usize) -> MemoryMappingBuilder<'a> {
        MemoryMappingBuilder {
            region: None,
            size,
            offset: 0,
            layout: None,
        }
    }

    /// Maps `region`. Required.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_region(mut self, region: &'a SharedMemoryRegion) -> MemoryMappingBuilder<'a> {
        self.region = Some(region);
        self
    }

    /// Offset in bytes from the start of the region. Default 0.
    pub fn offset(mut self, offset: usize) -> MemoryMappingBuilder<'a> {
        self.offset = offset;
        self
    }

    /// Memory layout used to align the native mapping. Default `MemoryLayout::host()`.
    pub fn layout(mut self, layout: MemoryLayout) -> MemoryMappingBuilder<'a> {
        self.layout = Some(layout);
        self
    }

    /// Validates the request and maps it.
    pub fn build(self) -> Result<MemoryMapping> {
        let region = self.region.ok_or(Error::InvalidArgument)?;
        let descriptor = region.descriptor().ok_or(Error::InvalidRegion)?;
        if self.size == 0 {
            return Err(Error::InvalidArgument);
        }
        checked_range_end(self.offset, self.size, region.size()).ok_or(Error::InvalidRange(
            self.offset,
            self.size,
            region.size(),
        ))?;

        let layout = self.layout.unwrap_or_else(MemoryLayout::host);
        let map_offset = layout.align_down_to_granularity(self.offset);
        let view_offset = self.offset - map_offset;
        // Cannot overflow: offset + size was checked above and map_offset <= offset.
        let map_size = self.size + view_offset;
        let protection = Protection::for_mode(region.mode());

        let mapping = PlatformMmap::from_descriptor_offset_protection(
            descriptor,
            map_size,
            map_offset as u64,
            protection,
        )?;
        Ok(MemoryMapping {
            mapping,
            view_offset,
            size: self.size,
            protection,
        })
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::fmt::Display;
use std::mem;

use log::debug;
use log::error;
use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::identity::validate_size;
use crate::MemoryLayout;
use crate::MemoryMapping;
use crate::MemoryMappingBuilder;
use crate::MmapResult;
use crate::PlatformHandle;
use crate::RegionGuid;
use crate::RegionHandle;
use crate::RegionHeader;
use crate::SafeDescriptor;

#[sorted]
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("failed to allocate {size} bytes of shared memory: {err}")]
    Allocate { size: usize, err: crate::Error },
    #[error("failed to convert shared memory region to {mode}: {err}")]
    Convert { mode: Mode, err: crate::Error },
    #[error("failed to duplicate shared memory handle: {0}")]
    Duplicate(crate::Error),
    #[error("shared memory region is invalid")]
    InvalidRegion,
    #[error("invalid shared memory region size {0}")]
    InvalidSize(u64),
    #[error("platform handle permissions do not correspond to {0} mode")]
    PermissionMismatch(Mode),
}
pub type Result<T> = std::result::Result<T, Error>;

/// Access mode of a [`SharedMemoryRegion`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Read-only access. Every held handle is refused write access by the OS. Reachable only by
    /// converting a `Writable` region.
    #[default]
    ReadOnly,
    /// Read and write access through the only reference to the object. Cannot be duplicated.
    Writable,
    /// Read and write access with no exclusivity; may be duplicated freely.
    Unsafe,
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Mode::ReadOnly => "read-only",
            Mode::Writable => "writable",
            Mode::Unsafe => "unsafe",
        };
        write!(f, "{}", s)
    }
}

/// An owned reference to a native shared memory object together with its size, access mode and
/// identifier.
///
/// The mode only moves forward: a region is born `Writable` or `Unsafe`, and a `Writable` region
/// may be converted once to `ReadOnly` or `Unsafe`. Because `Writable` regions cannot be
/// duplicated, at most one writable reference to an object exists, and after conversion to
/// `ReadOnly` the OS itself refuses writable mappings through any handle this region holds.
///
/// Violating those rules (creating a `ReadOnly` region, duplicating a `Writable` one, converting
/// a region that is not `Writable`) is a bug in the caller and panics. OS failures are returned as
/// errors and never change an existing region.
///
/// A region without a handle (`SharedMemoryRegion::default()`, or one whose handle was taken) is
/// invalid: its size is 0 and every operation on it fails.
#[derive(Debug, Default)]
pub struct SharedMemoryRegion {
    handle: Option<PlatformHandle>,
    mode: Mode,
    size: usize,
    guid: RegionGuid,
}

impl SharedMemoryRegion {
    /// Creates a new `Writable` region of `size` bytes.
    pub fn create_writable(size: usize) -> Result<SharedMemoryRegion> {
        SharedMemoryRegion::create(Mode::Writable, size)
    }

    /// Creates a new `Unsafe` region of `size` bytes.
    pub fn create_unsafe(size: usize) -> Result<SharedMemoryRegion> {
        SharedMemoryRegion::create(Mode::Unsafe, size)
    }

    /// Creates a new region of `size` bytes in `mode`, sized for the host's memory layout.
    ///
    /// # Panics
    ///
    /// If `mode` is `Mode::ReadOnly`.
    pub fn create(mode: Mode, size: usize) -> Result<SharedMemoryRegion> {
        SharedMemoryRegion::create_with_layout(mode, size, &MemoryLayout::host())
    }

    /// Creates a new region of `size` bytes in `mode`. The native allocation is rounded up to the
    /// page size of `layout`; [`size`](Self::size) still reports `size`.
    ///
    /// # Panics
    ///
    /// If `mode` is `Mode::ReadOnly`.
    pub fn create_with_layout(
        mode: Mode,
        size: usize,
        layout: &MemoryLayout,
    ) -> Result<SharedMemoryRegion> {
        assert_ne!(
            mode,
            Mode::ReadOnly,
            "Creating a region in read-only mode will lead to this region being non-modifiable"
        );
        let size = validate_size(size as u64).ok_or(Error::InvalidSize(size as u64))?;
        let alloc_size = layout
            .round_up_to_page(size)
            .ok_or(Error::InvalidSize(size as u64))?;
        let handle = PlatformHandle::allocate(mode, alloc_size).map_err(|err| {
            error!("failed to allocate {} bytes of shared memory: {}", alloc_size, err);
            Error::Allocate { size, err }
        })?;
        let guid = RegionGuid::generate();
        debug!(
            "created {} shared memory region {} of {} bytes ({} allocated)",
            mode, guid, size, alloc_size
        );
        Ok(SharedMemoryRegion {
            handle: Some(handle),
            mode,
            size,
            guid,
        })
    }

    /// Takes ownership of `handle`, received from elsewhere together with `mode`, `size` and
    /// `guid`.
    ///
    /// None of the values are trusted: `size` must be a valid region size and the OS must report
    /// that the handle's access rights correspond to `mode`. On error `handle` is closed.
    pub fn take(
        handle: PlatformHandle,
        mode: Mode,
        size: usize,
        guid: RegionGuid,
    ) -> Result<SharedMemoryRegion> {
        let size = validate_size(size as u64).ok_or(Error::InvalidSize(size as u64))?;
        if !handle.check_permissions(mode, size) {
            return Err(Error::PermissionMismatch(mode));
        }
        Ok(SharedMemoryRegion {
            handle: Some(handle),
            mode,
            size,
            guid,
        })
    }

    /// Rebuilds a region from a handle and the header sent with it. See [`take`](Self::take).
    pub fn from_parts(handle: PlatformHandle, header: RegionHeader) -> Result<SharedMemoryRegion> {
        let size = validate_size(header.size).ok_or(Error::InvalidSize(header.size))?;
        SharedMemoryRegion::take(handle, header.mode, size, header.guid)
    }

    /// Splits the region into its native handle and a header describing it, for sending to
    /// another process. Returns `None` for an invalid region.
    pub fn into_parts(mut self) -> Option<(PlatformHandle, RegionHeader)> {
        let header = RegionHeader {
            mode: self.mode,
            size: self.size as u64,
            guid: self.guid,
        };
        self.take_platform_handle().map(|handle| (handle, header))
    }

    /// Checks with the OS that the access rights of `handle` correspond to `mode` and that the
    /// object it refers to spans at least `size` bytes.
    pub fn check_platform_handle_permissions(
        handle: &PlatformHandle,
        mode: Mode,
        size: usize,
    ) -> bool {
        handle.check_permissions(mode, size)
    }

    /// Returns true if the region holds a native handle.
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// The size requested at creation. 0 for an invalid region.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn guid(&self) -> RegionGuid {
        self.guid
    }

    /// Borrows the native handle, or `None` for an invalid region.
    pub fn platform_handle(&self) -> Option<&PlatformHandle> {
        self.handle.as_ref()
    }

    pub(crate) fn descriptor(&self) -> Option<&SafeDescriptor> {
        self.handle.as_ref().map(RegionHandle::descriptor)
    }

    /// Gives up ownership of the native handle. The region is consumed; nothing closes the
    /// returned handle except its new owner.
    pub fn pass_platform_handle(mut self) -> Option<PlatformHandle> {
        self.take_platform_handle()
    }

    /// Moves the native handle out and leaves `self` invalid.
    pub fn take_platform_handle(&mut self) -> Option<PlatformHandle> {
        mem::take(self).handle
    }

    /// Converts a `Writable` region to `ReadOnly`.
    ///
    /// Afterwards no handle held by the region can be used to create a writable mapping. On error
    /// the region is unchanged.
    ///
    /// # Panics
    ///
    /// If the region is valid but not `Writable`.
    pub fn convert_to_read_only(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(Error::InvalidRegion)?;
        assert_eq!(
            self.mode,
            Mode::Writable,
            "Only writable shared memory region can be converted to read-only"
        );
        handle.convert_to_read_only().map_err(|err| {
            error!("failed to convert region {} to read-only: {}", self.guid, err);
            Error::Convert {
                mode: Mode::ReadOnly,
                err,
            }
        })?;
        self.mode = Mode::ReadOnly;
        debug!("converted region {} to read-only", self.guid);
        Ok(())
    }

    /// Converts a `Writable` region to `Unsafe`. On error the region is unchanged.
    ///
    /// # Panics
    ///
    /// If the region is valid but not `Writable`.
    pub fn convert_to_unsafe(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(Error::InvalidRegion)?;
        assert_eq!(
            self.mode,
            Mode::Writable,
            "Only writable shared memory region can be converted to unsafe"
        );
        handle.convert_to_unsafe().map_err(|err| {
            error!("failed to convert region {} to unsafe: {}", self.guid, err);
            Error::Convert {
                mode: Mode::Unsafe,
                err,
            }
        })?;
        self.mode = Mode::Unsafe;
        debug!("converted region {} to unsafe", self.guid);
        Ok(())
    }

    /// Creates another reference to the same native object with the same size, mode and
    /// identifier. `self` is unchanged.
    ///
    /// # Panics
    ///
    /// If the region is valid and `Writable`.
    pub fn duplicate(&self) -> Result<SharedMemoryRegion> {
        let handle = self.handle.as_ref().ok_or(Error::InvalidRegion)?;
        assert_ne!(
            self.mode,
            Mode::Writable,
            "Duplicating a writable shared memory region is prohibited"
        );
        let handle = handle.duplicate().map_err(|err| {
            error!("failed to duplicate region {}: {}", self.guid, err);
            Error::Duplicate(err)
        })?;
        Ok(SharedMemoryRegion {
            handle: Some(handle),
            mode: self.mode,
            size: self.size,
            guid: self.guid,
        })
    }

    /// Maps `size` bytes starting at `offset`. Read-only regions are mapped read-only, all others
    /// read-write.
    pub fn map_at(&self, offset: usize, size: usize) -> MmapResult<MemoryMapping> {
        MemoryMappingBuilder::new(size)
            .from_region(self)
            .offset(offset)
            .build()
    }

    /// Maps the whole region.
    pub fn map(&self) -> MmapResult<MemoryMapping> {
        self.map_at(0, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION_SIZE: usize = 1024;

    #[test]
    fn default_is_invalid() {
        let mut region = SharedMemoryRegion::default();
        assert!(!region.is_valid());
        assert_eq!(region.size(), 0);
        assert!(region.guid().is_nil());
        assert!(region.platform_handle().is_none());
        assert_eq!(region.duplicate().unwrap_err(), Error::InvalidRegion);
        assert_eq!(region.convert_to_read_only(), Err(Error::InvalidRegion));
        assert_eq!(region.convert_to_unsafe(), Err(Error::InvalidRegion));
        assert!(region.into_parts().is_none());
    }

    #[test]
    fn create_stamps_fresh_guid() {
        let a = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        let b = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        assert!(!a.guid().is_nil());
        assert_ne!(a.guid(), b.guid());
    }

    #[test]
    fn conversion_keeps_guid_and_size() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        let guid = region.guid();
        region.convert_to_read_only().unwrap();
        assert_eq!(region.guid(), guid);
        assert_eq!(region.size(), REGION_SIZE);
    }

    #[test]
    fn conversion_drops_read_only_descriptor() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        region.convert_to_unsafe().unwrap();
        assert!(region
            .platform_handle()
            .unwrap()
            .read_only_descriptor()
            .is_none());
    }

    #[test]
    fn take_platform_handle_leaves_default() {
        let mut region = SharedMemoryRegion::create_unsafe(REGION_SIZE).unwrap();
        let handle = region.take_platform_handle();
        assert!(handle.is_some());
        assert!(!region.is_valid());
        assert_eq!(region.size(), 0);
        assert!(region.guid().is_nil());
    }

    #[test]
    fn parts_round_trip() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        region.convert_to_read_only().unwrap();
        let guid = region.guid();
        let (handle, header) = region.into_parts().unwrap();
        assert_eq!(header.mode, Mode::ReadOnly);
        assert_eq!(header.size, REGION_SIZE as u64);
        assert_eq!(header.guid, guid);
        let region = SharedMemoryRegion::from_parts(handle, header).unwrap();
        assert!(region.is_valid());
        assert_eq!(region.guid(), guid);
    }

    #[test]
    fn from_parts_rejects_oversized_header() {
        let region = SharedMemoryRegion::create_unsafe(REGION_SIZE).unwrap();
        let (handle, mut header) = region.into_parts().unwrap();
        header.size = u64::MAX;
        assert_eq!(
            SharedMemoryRegion::from_parts(handle, header).unwrap_err(),
            Error::InvalidSize(u64::MAX)
        );
    }

    #[test]
    fn take_rejects_mislabelled_writable_handle() {
        let region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        let guid = region.guid();
        let handle = region.pass_platform_handle().unwrap();
        assert_eq!(
            SharedMemoryRegion::take(handle, Mode::ReadOnly, REGION_SIZE, guid).unwrap_err(),
            Error::PermissionMismatch(Mode::ReadOnly)
        );
    }

    #[test]
    fn take_rejects_handle_smaller_than_size() {
        let layout = MemoryLayout::host();
        let region = SharedMemoryRegion::create_unsafe(layout.page_size()).unwrap();
        let guid = region.guid();
        let handle = region.pass_platform_handle().unwrap();
        assert_eq!(
            SharedMemoryRegion::take(handle, Mode::Unsafe, 16 * layout.page_size(), guid)
                .unwrap_err(),
            Error::PermissionMismatch(Mode::Unsafe)
        );
    }

    #[test]
    fn mode_display() {
        assert_eq!(Mode::ReadOnly.to_string(), "read-only");
        assert_eq!(Mode::Writable.to_string(), "writable");
        assert_eq!(Mode::Unsafe.to_string(), "unsafe");
    }
}

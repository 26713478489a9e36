// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pagefile backed file mapping objects. Access rights live on the handle, so conversion to
//! read-only replaces the handle with a duplicate that was never granted `FILE_MAP_WRITE`.

use std::ptr::null;
use std::ptr::null_mut;

use log::error;
use winapi::shared::minwindef::DWORD;
use winapi::shared::minwindef::LPCVOID;
use winapi::um::handleapi::INVALID_HANDLE_VALUE;
use winapi::um::memoryapi::MapViewOfFile;
use winapi::um::memoryapi::UnmapViewOfFile;
use winapi::um::memoryapi::FILE_MAP_READ;
use winapi::um::memoryapi::FILE_MAP_WRITE;
use winapi::um::winbase::CreateFileMappingW;
use winapi::um::winnt::PAGE_READWRITE;
use winapi::um::winnt::SECTION_QUERY;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::AsRawDescriptors;
use crate::descriptor::FromRawDescriptor;
use crate::Error;
use crate::Mode;
use crate::RawDescriptor;
use crate::RegionHandle;
use crate::Result;
use crate::SafeDescriptor;

const READ_WRITE_ACCESS: DWORD = FILE_MAP_READ | FILE_MAP_WRITE | SECTION_QUERY;
const READ_ONLY_ACCESS: DWORD = FILE_MAP_READ | SECTION_QUERY;

/// Returns true if a view of `size` bytes with `access` can be mapped from `handle`.
fn can_map(handle: &SafeDescriptor, access: DWORD, size: usize) -> bool {
    // SAFETY:
    // Safe because we map a fresh view, check the result and unmap it before returning.
    unsafe {
        let addr = MapViewOfFile(handle.as_raw_descriptor(), access, 0, 0, size);
        if addr.is_null() {
            return false;
        }
        UnmapViewOfFile(addr as LPCVOID);
    }
    true
}

/// The file mapping object behind a region.
#[derive(Debug)]
pub struct PlatformHandle {
    handle: SafeDescriptor,
}

impl PlatformHandle {
    /// Wraps a handle received from elsewhere. Use `SharedMemoryRegion::take` to check it.
    pub fn new(handle: SafeDescriptor) -> PlatformHandle {
        PlatformHandle { handle }
    }

    pub fn into_descriptor(self) -> SafeDescriptor {
        self.handle
    }
}

impl AsRawDescriptors for PlatformHandle {
    fn as_raw_descriptors(&self) -> Vec<RawDescriptor> {
        vec![self.handle.as_raw_descriptor()]
    }
}

impl RegionHandle for PlatformHandle {
    fn allocate(_mode: Mode, size: usize) -> Result<PlatformHandle> {
        let size = size as u64;
        // SAFETY:
        // Safe because we pass no name and no security attributes, and check the result.
        let raw = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                null_mut(),
                PAGE_READWRITE,
                (size >> 32) as DWORD,
                size as DWORD,
                null(),
            )
        };
        // CreateFileMappingW reports failure with NULL, not INVALID_HANDLE_VALUE.
        if raw.is_null() {
            return Err(Error::last());
        }
        // SAFETY:
        // CreateFileMappingW just returned this handle and nothing else owns it.
        let created = unsafe { SafeDescriptor::from_raw_descriptor(raw) };
        // Trim the rights down to what a region needs.
        let handle = created.duplicate_with_access(READ_WRITE_ACCESS)?;
        Ok(PlatformHandle { handle })
    }

    fn duplicate(&self) -> Result<PlatformHandle> {
        Ok(PlatformHandle {
            handle: self.handle.try_clone()?,
        })
    }

    fn convert_to_read_only(&mut self) -> Result<()> {
        self.handle = self.handle.duplicate_with_access(READ_ONLY_ACCESS)?;
        Ok(())
    }

    // A handle cannot be locked against later downgrades, so there is nothing to do.
    fn convert_to_unsafe(&mut self) -> Result<()> {
        Ok(())
    }

    fn check_permissions(&self, mode: Mode, size: usize) -> bool {
        let writable = can_map(&self.handle, FILE_MAP_READ | FILE_MAP_WRITE, size);
        if writable != (mode != Mode::ReadOnly) {
            error!(
                "file mapping handle is {}writable, which does not correspond to {} mode",
                if writable { "" } else { "not " },
                mode
            );
            return false;
        }
        if !writable && !can_map(&self.handle, FILE_MAP_READ, size) {
            error!("cannot map {} bytes of the file mapping object", size);
            return false;
        }
        true
    }

    fn descriptor(&self) -> &SafeDescriptor {
        &self.handle
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Views of file mapping objects. UnmapViewOfFile is called when the view leaves scope.

use winapi::shared::minwindef::DWORD;
use winapi::shared::minwindef::LPCVOID;
use winapi::um::memoryapi::MapViewOfFile;
use winapi::um::memoryapi::UnmapViewOfFile;
use winapi::um::memoryapi::FILE_MAP_READ;
use winapi::um::memoryapi::FILE_MAP_WRITE;

use super::allocation_granularity;
use crate::descriptor::AsRawDescriptor;
use crate::errno::Error as ErrnoError;
use crate::MmapError as Error;
use crate::MmapResult as Result;
use crate::Protection;

impl From<Protection> for DWORD {
    #[inline(always)]
    fn from(p: Protection) -> Self {
        let mut value = 0;
        if p.read {
            value |= FILE_MAP_READ;
        }
        if p.write {
            value |= FILE_MAP_WRITE;
        }
        value
    }
}

fn high_order(value: u64) -> DWORD {
    (value >> 32) as DWORD
}

fn low_order(value: u64) -> DWORD {
    value as DWORD
}

/// A view of a file mapping object in the current process.
#[derive(Debug)]
pub struct MemoryMapping {
    addr: *mut u8,
    size: usize,
}

// SAFETY:
// Send and Sync aren't automatically inherited for the raw address pointer.
// Accessing that pointer is only done through the stateless interface which
// allows the object to be shared by multiple threads without a decrease in
// safety.
unsafe impl Send for MemoryMapping {}
// SAFETY: See safety comments for impl Send
unsafe impl Sync for MemoryMapping {}

impl MemoryMapping {
    /// Maps the `size` bytes starting at `offset` bytes of the file mapping object behind
    /// `file_handle` with `prot` protections.
    pub fn from_descriptor_offset_protection(
        file_handle: &dyn AsRawDescriptor,
        size: usize,
        offset: u64,
        prot: Protection,
    ) -> Result<MemoryMapping> {
        // on windows, views must start at a multiple of the allocation granularity, and the
        // maximum valid value is an i64.
        if offset % allocation_granularity() as u64 != 0 || offset > i64::MAX as u64 {
            return Err(Error::InvalidOffset);
        }
        // SAFETY:
        // This is safe because we are creating a view in a place not already used by any other
        // area in this process and we check the result.
        let addr = unsafe {
            MapViewOfFile(
                file_handle.as_raw_descriptor(),
                prot.into(),
                high_order(offset),
                low_order(offset),
                size,
            )
        };
        if addr.is_null() {
            return Err(Error::SystemCallFailed(ErrnoError::last()));
        }
        Ok(MemoryMapping {
            addr: addr as *mut u8,
            size,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // SAFETY:
        // This is safe because we mapped the view at addr ourselves, and nobody
        // else is holding a reference to it.
        unsafe {
            UnmapViewOfFile(self.addr as LPCVOID);
        }
    }
}

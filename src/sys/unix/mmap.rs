// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Common mmap support shared between Linux and macOS.

use std::ptr::null_mut;

use libc::c_int;
use libc::PROT_READ;
use libc::PROT_WRITE;

use crate::descriptor::AsRawDescriptor;
use crate::errno::Error as ErrnoError;
use crate::MmapError as Error;
use crate::MmapResult as Result;
use crate::Protection;

impl From<Protection> for c_int {
    #[inline(always)]
    fn from(p: Protection) -> Self {
        let mut value = 0;
        if p.read {
            value |= PROT_READ
        }
        if p.write {
            value |= PROT_WRITE;
        }
        value
    }
}

/// Wraps an anonymous shared memory mapping in the current process. Unmaps on drop.
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
    /// Maps the `size` bytes starting at `offset` bytes of the given `descriptor` with `prot`
    /// protections, shared with every other mapping of the same object.
    pub fn from_descriptor_offset_protection(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        offset: u64,
        prot: Protection,
    ) -> Result<MemoryMapping> {
        let offset: libc::off_t = offset.try_into().map_err(|_| Error::InvalidOffset)?;
        // SAFETY:
        // This is safe because we are creating a mapping in a place not already used by any other
        // area in this process and we check the result.
        let addr = unsafe {
            libc::mmap(
                null_mut(),
                size,
                prot.into(),
                libc::MAP_SHARED,
                descriptor.as_raw_descriptor(),
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
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
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        unsafe {
            libc::munmap(self.addr as *mut libc::c_void, self.size);
        }
    }
}

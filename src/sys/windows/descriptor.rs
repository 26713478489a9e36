// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::marker::Send;
use std::marker::Sync;
use std::ops::Drop;
use std::os::windows::io::RawHandle;
use std::ptr;

use winapi::shared::minwindef::DWORD;
use winapi::shared::minwindef::FALSE;
use winapi::um::handleapi::CloseHandle;
use winapi::um::handleapi::DuplicateHandle;
use winapi::um::processthreadsapi::GetCurrentProcess;
use winapi::um::winnt::DUPLICATE_SAME_ACCESS;

use crate::descriptor::SafeDescriptor;
use crate::errno_result;
use crate::Result;

pub type RawDescriptor = RawHandle;

// Handles to distinct file mapping objects never share a value within a process.
impl PartialEq for SafeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl Drop for SafeDescriptor {
    fn drop(&mut self) {
        // SAFETY: trivially safe
        unsafe { CloseHandle(self.descriptor) };
    }
}

fn duplicate(handle: RawHandle, access: DWORD, options: DWORD) -> Result<SafeDescriptor> {
    let mut new_handle: RawHandle = ptr::null_mut();
    // SAFETY:
    // Safe because:
    // 1. We are checking the return code
    // 2. new_handle points to a valid location on the stack
    // 3. `handle` is owned by a live SafeDescriptor.
    let success = unsafe {
        DuplicateHandle(
            /* hSourceProcessHandle= */ GetCurrentProcess(),
            /* hSourceHandle= */ handle,
            /* hTargetProcessHandle= */ GetCurrentProcess(),
            /* lpTargetHandle= */ &mut new_handle,
            /* dwDesiredAccess= */ access,
            /* bInheritHandle= */ FALSE,
            /* dwOptions= */ options,
        )
    };
    if success == FALSE {
        errno_result()
    } else {
        Ok(SafeDescriptor {
            descriptor: new_handle,
        })
    }
}

impl SafeDescriptor {
    /// Clones this descriptor, internally creating a new descriptor. The new SafeDescriptor will
    /// share the same underlying count within the kernel.
    pub fn try_clone(&self) -> Result<SafeDescriptor> {
        duplicate(self.descriptor, 0, DUPLICATE_SAME_ACCESS)
    }

    /// Creates a new handle to the same object granting exactly `access`. Fails if `access`
    /// asks for more than this handle grants.
    pub fn duplicate_with_access(&self, access: DWORD) -> Result<SafeDescriptor> {
        duplicate(self.descriptor, access, 0)
    }
}

// SAFETY:
// On Windows, RawHandles are represented by raw pointers but are not used as such in
// rust code, and are therefore safe to send between threads.
unsafe impl Send for SafeDescriptor {}
// SAFETY: See comments for impl Send
unsafe impl Sync for SafeDescriptor {}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::mem::MaybeUninit;

use once_cell::sync::Lazy;
use winapi::um::sysinfoapi::GetNativeSystemInfo;
use winapi::um::sysinfoapi::SYSTEM_INFO;

struct SystemInfo {
    pagesize: usize,
    allocation_granularity: usize,
}

static SYSTEM_INFO: Lazy<SystemInfo> = Lazy::new(|| {
    // SAFETY:
    // Safe because this is a universally available call on modern Windows systems.
    let sysinfo = unsafe {
        let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
        GetNativeSystemInfo(sysinfo.as_mut_ptr());
        sysinfo.assume_init()
    };

    SystemInfo {
        pagesize: sysinfo.dwPageSize as usize,
        allocation_granularity: sysinfo.dwAllocationGranularity as usize,
    }
});

/// Returns the system page size in bytes.
pub fn pagesize() -> usize {
    SYSTEM_INFO.pagesize
}

/// Returns the minimum memory allocation granularity in bytes. View offsets must be multiples of
/// this.
pub fn allocation_granularity() -> usize {
    SYSTEM_INFO.allocation_granularity
}

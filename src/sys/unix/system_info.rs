// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use libc::sysconf;
use libc::_SC_PAGESIZE;

/// Safe wrapper for `sysconf(_SC_PAGESIZE)`.
#[inline(always)]
pub fn pagesize() -> usize {
    // SAFETY:
    // Trivially safe
    unsafe { sysconf(_SC_PAGESIZE) as usize }
}

/// Returns the minimum offset alignment accepted by `mmap`, which on unix is the page size.
#[inline(always)]
pub fn allocation_granularity() -> usize {
    pagesize()
}

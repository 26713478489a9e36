// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pieces shared by every unix platform.

pub mod descriptor;
mod mmap;
mod system_info;

pub use descriptor::*;
pub use mmap::MemoryMapping;
pub use system_info::allocation_granularity;
pub use system_info::pagesize;

#[macro_export]
macro_rules! syscall {
    ($e:expr) => {{
        let res = $e;
        if res < 0 {
            $crate::errno_result()
        } else {
            Ok(res)
        }
    }};
}

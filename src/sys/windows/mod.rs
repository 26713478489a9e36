// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod descriptor;
mod mmap;
mod shm;
mod system_info;

pub use descriptor::*;
pub use mmap::MemoryMapping;
pub use shm::PlatformHandle;
pub use system_info::allocation_granularity;
pub use system_info::pagesize;

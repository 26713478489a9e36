// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Cross-platform shared memory regions with an explicit access mode.
//!
//! A [`SharedMemoryRegion`] owns the native handle(s) of an OS shared memory object. Regions are
//! created `Writable` or `Unsafe`; a `Writable` region may be converted once to `ReadOnly`, after
//! which the OS refuses writable mappings through any handle the region holds.

pub mod descriptor;
mod errno;
mod handle;
mod identity;
mod layout;
mod mmap;
mod region;
pub mod sys;
pub mod syslog;

pub use errno::errno_result;
pub use errno::Error;
pub use errno::Result;
pub use handle::RegionHandle;
pub use identity::RegionGuid;
pub use identity::RegionHeader;
pub use identity::MAX_REGION_SIZE;
pub use layout::LayoutError;
pub use layout::MemoryLayout;
pub use mmap::Error as MmapError;
pub use mmap::MemoryMapping;
pub use mmap::MemoryMappingBuilder;
pub use mmap::Protection;
pub use mmap::Result as MmapResult;
pub use region::Error as RegionError;
pub use region::Mode;
pub use region::Result as RegionResult;
pub use region::SharedMemoryRegion;
pub use sys::platform;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "android", target_os = "linux"))] {
        pub use platform::MemfdSeals;
    }
}

pub use log::debug;
pub use log::error;
pub use log::info;
pub use log::trace;
pub use log::warn;
pub use platform::allocation_granularity;
pub use platform::pagesize;
pub use platform::PlatformHandle;
pub use platform::RawDescriptor;

pub use crate::descriptor::AsRawDescriptor;
pub use crate::descriptor::AsRawDescriptors;
pub use crate::descriptor::FromRawDescriptor;
pub use crate::descriptor::IntoRawDescriptor;
pub use crate::descriptor::SafeDescriptor;

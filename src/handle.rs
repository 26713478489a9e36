// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::descriptor::AsRawDescriptors;
use crate::Mode;
use crate::Result;
use crate::SafeDescriptor;

/// Native operations a shared memory handle provides to
/// [`SharedMemoryRegion`](crate::SharedMemoryRegion).
///
/// Exactly one implementation, [`PlatformHandle`](crate::PlatformHandle), is compiled for each
/// target. Implementations only talk to the OS; mode bookkeeping, size validation and the
/// programming-error checks all live in the region.
pub trait RegionHandle: AsRawDescriptors + Sized {
    /// Allocates a new native shared memory object of `size` bytes that will be used in `mode`.
    ///
    /// For `Mode::Writable` on platforms that cannot downgrade a handle in place, this also
    /// reserves the read-only handle. Either every handle is allocated or none is.
    fn allocate(mode: Mode, size: usize) -> Result<Self>;

    /// Creates a new reference to the same native object. `self` is not modified.
    fn duplicate(&self) -> Result<Self>;

    /// Removes write access from every handle held by `self`.
    ///
    /// On failure `self` is left as it was.
    fn convert_to_read_only(&mut self) -> Result<()>;

    /// Drops any reserved read-only handle and marks the object as never to be downgraded.
    ///
    /// On failure `self` is left as it was.
    fn convert_to_unsafe(&mut self) -> Result<()>;

    /// Queries the OS for the access rights actually granted to the held handle(s) and returns
    /// true if they correspond to `mode` and the object spans at least `size` bytes.
    fn check_permissions(&self, mode: Mode, size: usize) -> bool;

    /// The handle used for mapping the object.
    fn descriptor(&self) -> &SafeDescriptor;

    /// The reserved read-only handle, if this platform uses one and it is still held.
    fn read_only_descriptor(&self) -> Option<&SafeDescriptor> {
        None
    }
}

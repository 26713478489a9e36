// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Identity and size checks applied wherever a region crosses a boundary.

use std::fmt;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::Mode;

/// Largest size a region may have. Sizes travel next to the handle as a signed 32-bit value, so
/// anything above `i32::MAX` is refused even where the OS could allocate it.
pub const MAX_REGION_SIZE: usize = i32::MAX as usize;

/// Process-independent identifier of the native object behind a region.
///
/// Every duplicate and every hand-off of a region carries the same identifier, so receivers can
/// tell that two handles refer to the same memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionGuid(Uuid);

impl RegionGuid {
    /// Creates a new random identifier.
    pub fn generate() -> RegionGuid {
        RegionGuid(Uuid::new_v4())
    }

    pub fn from_u128(v: u128) -> RegionGuid {
        RegionGuid(Uuid::from_u128(v))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// True for the all-zero identifier carried by invalid regions.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for RegionGuid {
    fn default() -> Self {
        RegionGuid(Uuid::nil())
    }
}

impl Display for RegionGuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Checks that `size` can describe a region, returning it as a `usize`.
///
/// Returns `None` for zero and for anything above [`MAX_REGION_SIZE`].
pub fn validate_size(size: u64) -> Option<usize> {
    let size = usize::try_from(size).ok()?;
    if size == 0 || size > MAX_REGION_SIZE {
        None
    } else {
        Some(size)
    }
}

/// Returns the end of `offset`..`offset + len` if it neither overflows nor extends past `size`.
pub fn checked_range_end(offset: usize, len: usize, size: usize) -> Option<usize> {
    offset.checked_add(len).filter(|&end| end <= size)
}

/// Everything about a region except its native handles, in the shape that is sent alongside the
/// handles to another process.
///
/// The receiver must not trust any field: [`SharedMemoryRegion::from_parts`] re-validates the
/// size and checks the handles' OS-level permissions against `mode`.
///
/// [`SharedMemoryRegion::from_parts`]: crate::SharedMemoryRegion::from_parts
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionHeader {
    pub mode: Mode,
    pub size: u64,
    pub guid: RegionGuid,
}

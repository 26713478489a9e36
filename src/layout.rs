// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::allocation_granularity;
use crate::pagesize;

#[sorted]
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    #[error("allocation granularity {granularity} is smaller than the page size {page_size}")]
    GranularityBelowPageSize { page_size: usize, granularity: usize },
    #[error("allocation granularity {0} is not a power of two")]
    InvalidGranularity(usize),
    #[error("page size {0} is not a power of two")]
    InvalidPageSize(usize),
}

/// Page size and allocation granularity used to size native allocations and align mappings.
///
/// `MemoryLayout::host()` asks the OS. Tests and callers with their own view of the host can
/// build one with `MemoryLayout::new` or deserialize it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMemoryLayout")]
pub struct MemoryLayout {
    page_size: usize,
    allocation_granularity: usize,
}

#[derive(Deserialize)]
struct RawMemoryLayout {
    page_size: usize,
    allocation_granularity: usize,
}

impl TryFrom<RawMemoryLayout> for MemoryLayout {
    type Error = LayoutError;

    fn try_from(raw: RawMemoryLayout) -> Result<Self, Self::Error> {
        MemoryLayout::new(raw.page_size, raw.allocation_granularity)
    }
}

impl MemoryLayout {
    pub fn new(page_size: usize, allocation_granularity: usize) -> Result<Self, LayoutError> {
        if !page_size.is_power_of_two() {
            return Err(LayoutError::InvalidPageSize(page_size));
        }
        if !allocation_granularity.is_power_of_two() {
            return Err(LayoutError::InvalidGranularity(allocation_granularity));
        }
        if allocation_granularity < page_size {
            return Err(LayoutError::GranularityBelowPageSize {
                page_size,
                granularity: allocation_granularity,
            });
        }
        Ok(MemoryLayout {
            page_size,
            allocation_granularity,
        })
    }

    /// The layout of the running host.
    pub fn host() -> Self {
        MemoryLayout {
            page_size: pagesize(),
            allocation_granularity: allocation_granularity(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn allocation_granularity(&self) -> usize {
        self.allocation_granularity
    }

    /// Rounds `size` up to the next page boundary, or `None` if that overflows.
    pub fn round_up_to_page(&self, size: usize) -> Option<usize> {
        let page_mask = self.page_size - 1;
        size.checked_add(page_mask).map(|v| v & !page_mask)
    }

    /// Rounds `offset` down to the allocation granularity, the alignment mappings must start at.
    pub fn align_down_to_granularity(&self, offset: usize) -> usize {
        offset & !(self.allocation_granularity - 1)
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        MemoryLayout::host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_layout_is_consistent() {
        let host = MemoryLayout::host();
        assert_eq!(
            MemoryLayout::new(host.page_size(), host.allocation_granularity()),
            Ok(host)
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            MemoryLayout::new(4095, 4096),
            Err(LayoutError::InvalidPageSize(4095))
        );
        assert_eq!(
            MemoryLayout::new(4096, 0),
            Err(LayoutError::InvalidGranularity(0))
        );
        assert_eq!(
            MemoryLayout::new(4096, 2048),
            Err(LayoutError::GranularityBelowPageSize {
                page_size: 4096,
                granularity: 2048
            })
        );
    }

    #[test]
    fn rounding() {
        let layout = MemoryLayout::new(4096, 65536).unwrap();
        assert_eq!(layout.round_up_to_page(1), Some(4096));
        assert_eq!(layout.round_up_to_page(4096), Some(4096));
        assert_eq!(layout.round_up_to_page(4097), Some(8192));
        assert_eq!(layout.round_up_to_page(usize::MAX), None);
        assert_eq!(layout.align_down_to_granularity(65535), 0);
        assert_eq!(layout.align_down_to_granularity(65536 + 10), 65536);
    }

    #[test]
    fn deserialize_validates() {
        let layout: MemoryLayout =
            serde_json::from_str(r#"{"page_size":4096,"allocation_granularity":65536}"#).unwrap();
        assert_eq!(layout.allocation_granularity(), 65536);
        assert!(serde_json::from_str::<MemoryLayout>(
            r#"{"page_size":3000,"allocation_granularity":65536}"#
        )
        .is_err());
    }
}

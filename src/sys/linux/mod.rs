// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod descriptor_cmp;
mod shm;

pub use shm::MemfdSeals;
pub use shm::PlatformHandle;

pub use crate::sys::unix::*;

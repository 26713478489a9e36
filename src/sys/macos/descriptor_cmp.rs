// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::descriptor::SafeDescriptor;

// There is no kcmp on macOS, so only identical descriptor numbers compare equal.
impl PartialEq for SafeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

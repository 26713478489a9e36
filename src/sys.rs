// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#[cfg(unix)]
pub mod unix;

#[cfg(any(target_os = "android", target_os = "linux"))]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(windows)]
pub mod windows;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "android", target_os = "linux"))] {
        pub use linux as platform;
        pub use platform::*;
    } else if #[cfg(target_os = "macos")] {
        pub use macos as platform;
        pub use platform::*;
    } else if #[cfg(windows)] {
        pub use windows as platform;
        pub use platform::*;
    } else {
        compile_error!("Unsupported platform");
    }
}

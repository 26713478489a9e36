// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::ops::Drop;
use std::os::unix::io::RawFd;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::SafeDescriptor;
use crate::errno_result;
use crate::Result;

pub type RawDescriptor = RawFd;

impl Drop for SafeDescriptor {
    fn drop(&mut self) {
        // SAFETY:
        // Safe because we own the descriptor and never use it after this.
        let _ = unsafe { libc::close(self.descriptor) };
    }
}

impl SafeDescriptor {
    /// Clones this descriptor, internally creating a new descriptor. The new SafeDescriptor will
    /// share the same underlying count within the kernel.
    pub fn try_clone(&self) -> Result<SafeDescriptor> {
        // SAFETY:
        // Safe because this doesn't modify any memory and we check the return value.
        let descriptor = unsafe { libc::fcntl(self.descriptor, libc::F_DUPFD_CLOEXEC, 0) };
        if descriptor < 0 {
            errno_result()
        } else {
            Ok(SafeDescriptor { descriptor })
        }
    }
}

/// Returns the `O_ACCMODE` bits (`O_RDONLY`, `O_WRONLY` or `O_RDWR`) the descriptor was opened
/// with.
pub fn access_mode(descriptor: &dyn AsRawDescriptor) -> Result<libc::c_int> {
    // SAFETY:
    // Safe because F_GETFL only reads the descriptor's status flags.
    let flags = unsafe { libc::fcntl(descriptor.as_raw_descriptor(), libc::F_GETFL) };
    if flags < 0 {
        return errno_result();
    }
    Ok(flags & libc::O_ACCMODE)
}

/// Returns the size in bytes of the object behind `descriptor` as reported by `fstat`.
pub fn object_size(descriptor: &dyn AsRawDescriptor) -> Result<u64> {
    let mut st = std::mem::MaybeUninit::<libc::stat>::zeroed();
    // SAFETY:
    // Safe because the kernel only writes a `stat` into memory we own and we check the result.
    let ret = unsafe { libc::fstat(descriptor.as_raw_descriptor(), st.as_mut_ptr()) };
    if ret < 0 {
        return errno_result();
    }
    // SAFETY:
    // fstat succeeded so the struct is initialized.
    let st = unsafe { st.assume_init() };
    Ok(st.st_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FromRawDescriptor;

    fn pipe() -> (SafeDescriptor, SafeDescriptor) {
        let mut fds = [0; 2];
        // SAFETY:
        // Safe because we pass a valid two element array and check the result.
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(ret, 0);
        // SAFETY:
        // The pipe call just returned these descriptors to us.
        unsafe {
            (
                SafeDescriptor::from_raw_descriptor(fds[0]),
                SafeDescriptor::from_raw_descriptor(fds[1]),
            )
        }
    }

    #[test]
    fn pipe_ends_report_access_mode() {
        let (read, write) = pipe();
        assert_eq!(access_mode(&read).unwrap(), libc::O_RDONLY);
        assert_eq!(access_mode(&write).unwrap(), libc::O_WRONLY);
    }

    #[test]
    fn clone_keeps_access_mode() {
        let (read, _write) = pipe();
        let clone = read.try_clone().unwrap();
        assert_ne!(clone.as_raw_descriptor(), read.as_raw_descriptor());
        assert_eq!(access_mode(&clone).unwrap(), libc::O_RDONLY);
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! POSIX shared memory regions. macOS cannot revoke write access from an open descriptor, so a
//! writable region carries a second descriptor opened read-only on the same object. Converting
//! to read-only swaps that descriptor in and closes the writable one.

use std::ffi::CString;

use libc::c_uint;
use libc::fcntl;
use libc::ftruncate;
use libc::off_t;
use libc::shm_open;
use libc::shm_unlink;
use libc::EBADF;
use libc::FD_CLOEXEC;
use libc::F_SETFD;
use libc::O_CREAT;
use libc::O_EXCL;
use libc::O_RDONLY;
use libc::O_RDWR;
use libc::S_IRUSR;
use libc::S_IWUSR;
use log::error;
use uuid::Uuid;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::AsRawDescriptors;
use crate::descriptor::FromRawDescriptor;
use crate::platform::access_mode;
use crate::platform::object_size;
use crate::syscall;
use crate::Error;
use crate::Mode;
use crate::RawDescriptor;
use crate::RegionHandle;
use crate::Result;
use crate::SafeDescriptor;

// PSHMNAMLEN is 31 on macOS; "/shr." plus 24 hex digits leaves room for the terminator.
const NAME_PREFIX: &str = "/shr.";
const NAME_RANDOM_LEN: usize = 24;

fn unique_name() -> Result<CString> {
    let random = Uuid::new_v4().simple().to_string();
    let name = format!("{}{}", NAME_PREFIX, &random[..NAME_RANDOM_LEN]);
    CString::new(name).map_err(|_| Error::new(libc::EINVAL))
}

fn open(name: &CString, oflag: i32) -> Result<SafeDescriptor> {
    // SAFETY:
    // Safe because `name` is a valid C string and we check the result.
    let fd = syscall!(unsafe { shm_open(name.as_ptr(), oflag, (S_IRUSR | S_IWUSR) as c_uint) })?;
    // SAFETY:
    // shm_open just returned this descriptor and nothing else owns it.
    let fd = unsafe { SafeDescriptor::from_raw_descriptor(fd) };
    // SAFETY:
    // Safe because F_SETFD only changes the descriptor flags.
    syscall!(unsafe { fcntl(fd.as_raw_descriptor(), F_SETFD, FD_CLOEXEC) })?;
    Ok(fd)
}

/// The POSIX shared memory object behind a region.
#[derive(Debug)]
pub struct PlatformHandle {
    fd: SafeDescriptor,
    readonly_fd: Option<SafeDescriptor>,
}

impl PlatformHandle {
    /// Wraps descriptors received from elsewhere. Use `SharedMemoryRegion::take` to check them.
    pub fn new(fd: SafeDescriptor, readonly_fd: Option<SafeDescriptor>) -> PlatformHandle {
        PlatformHandle { fd, readonly_fd }
    }

    pub fn into_descriptors(self) -> (SafeDescriptor, Option<SafeDescriptor>) {
        (self.fd, self.readonly_fd)
    }
}

impl AsRawDescriptors for PlatformHandle {
    fn as_raw_descriptors(&self) -> Vec<RawDescriptor> {
        let mut descriptors = vec![self.fd.as_raw_descriptor()];
        if let Some(readonly_fd) = &self.readonly_fd {
            descriptors.push(readonly_fd.as_raw_descriptor());
        }
        descriptors
    }
}

impl RegionHandle for PlatformHandle {
    fn allocate(mode: Mode, size: usize) -> Result<PlatformHandle> {
        let name = unique_name()?;
        let fd = open(&name, O_RDWR | O_CREAT | O_EXCL);
        let readonly_fd = match (&fd, mode) {
            (Ok(_), Mode::Writable) => Some(open(&name, O_RDONLY)),
            _ => None,
        };
        // The name is only needed to open the second descriptor.
        // SAFETY:
        // Safe because `name` is a valid C string.
        if unsafe { shm_unlink(name.as_ptr()) } < 0 {
            error!("shm_unlink failed: {}", Error::last());
        }
        let fd = fd?;
        let readonly_fd = readonly_fd.transpose()?;

        let size: off_t = size.try_into().map_err(|_| Error::new(libc::EINVAL))?;
        // SAFETY:
        // Safe because ftruncate doesn't touch our memory and we check the result.
        syscall!(unsafe { ftruncate(fd.as_raw_descriptor(), size) })?;
        Ok(PlatformHandle { fd, readonly_fd })
    }

    fn duplicate(&self) -> Result<PlatformHandle> {
        let readonly_fd = match &self.readonly_fd {
            Some(fd) => Some(fd.try_clone()?),
            None => None,
        };
        Ok(PlatformHandle {
            fd: self.fd.try_clone()?,
            readonly_fd,
        })
    }

    fn convert_to_read_only(&mut self) -> Result<()> {
        match self.readonly_fd.take() {
            Some(readonly_fd) => {
                self.fd = readonly_fd;
                Ok(())
            }
            None => Err(Error::new(EBADF)),
        }
    }

    fn convert_to_unsafe(&mut self) -> Result<()> {
        self.readonly_fd = None;
        Ok(())
    }

    fn check_permissions(&self, mode: Mode, size: usize) -> bool {
        let (access, object_size) = match (access_mode(&self.fd), object_size(&self.fd)) {
            (Ok(access), Ok(object_size)) => (access, object_size),
            (access, object_size) => {
                error!(
                    "failed to query shared memory object: access={:?} size={:?}",
                    access, object_size
                );
                return false;
            }
        };
        if object_size < size as u64 {
            error!(
                "shared memory object spans {} bytes, less than the region size {}",
                object_size, size
            );
            return false;
        }
        let expected = if mode == Mode::ReadOnly { O_RDONLY } else { O_RDWR };
        if access != expected {
            error!(
                "descriptor access mode {:#x} does not correspond to {} mode",
                access, mode
            );
            return false;
        }
        match (mode, &self.readonly_fd) {
            (Mode::Writable, Some(readonly_fd)) => match access_mode(readonly_fd) {
                Ok(O_RDONLY) => true,
                r => {
                    error!("read-only descriptor is not read-only: {:?}", r);
                    false
                }
            },
            (Mode::Writable, None) => {
                error!("writable region is missing its read-only descriptor");
                false
            }
            (_, Some(_)) => {
                error!("{} region must not carry a read-only descriptor", mode);
                false
            }
            (_, None) => true,
        }
    }

    fn descriptor(&self) -> &SafeDescriptor {
        &self.fd
    }

    fn read_only_descriptor(&self) -> Option<&SafeDescriptor> {
        self.readonly_fd.as_ref()
    }
}

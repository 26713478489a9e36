// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! memfd backed regions. A single descriptor is held in every mode; conversion to read-only is
//! done in place with file seals, which the kernel applies to every descriptor and every later
//! open of the same memfd.

use libc::c_char;
use libc::c_int;
use libc::c_long;
use libc::c_uint;
use libc::fcntl;
use libc::ftruncate64;
use libc::off64_t;
use libc::syscall;
use libc::SYS_memfd_create;
use libc::EINVAL;
use libc::F_ADD_SEALS;
use libc::F_GET_SEALS;
use libc::F_SEAL_FUTURE_WRITE;
use libc::F_SEAL_GROW;
use libc::F_SEAL_SEAL;
use libc::F_SEAL_SHRINK;
use libc::F_SEAL_WRITE;
use libc::MFD_ALLOW_SEALING;
use libc::O_RDWR;
use log::error;
use log::warn;

use crate::descriptor::AsRawDescriptor;
use crate::descriptor::AsRawDescriptors;
use crate::descriptor::FromRawDescriptor;
use crate::platform::access_mode;
use crate::platform::object_size;
use crate::syscall;
use crate::Mode;
use crate::RawDescriptor;
use crate::RegionHandle;
use crate::Result;
use crate::SafeDescriptor;

// from <sys/memfd.h>
const MFD_CLOEXEC: c_uint = 0x0001;

const MEMFD_NAME: &[u8] = b"shm_region\0";

unsafe fn memfd_create(name: *const c_char, flags: c_uint) -> c_int {
    syscall(SYS_memfd_create as c_long, name, flags) as c_int
}

/// A set of memfd seals.
///
/// An enumeration of each bit can be found at `fcntl(2)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemfdSeals(i32);

impl MemfdSeals {
    /// Returns an empty set of memfd seals.
    #[inline]
    pub fn new() -> MemfdSeals {
        MemfdSeals(0)
    }

    /// Gets the raw bitmask of seals enumerated in `fcntl(2)`.
    #[inline]
    pub fn bitmask(self) -> i32 {
        self.0
    }

    /// True if the grow seal bit is present.
    #[inline]
    pub fn grow_seal(self) -> bool {
        self.0 & F_SEAL_GROW != 0
    }

    /// Sets the grow seal bit.
    #[inline]
    pub fn set_grow_seal(&mut self) {
        self.0 |= F_SEAL_GROW;
    }

    /// True if the shrink seal bit is present.
    #[inline]
    pub fn shrink_seal(self) -> bool {
        self.0 & F_SEAL_SHRINK != 0
    }

    /// Sets the shrink seal bit.
    #[inline]
    pub fn set_shrink_seal(&mut self) {
        self.0 |= F_SEAL_SHRINK;
    }

    /// True if the write seal bit is present.
    #[inline]
    pub fn write_seal(self) -> bool {
        self.0 & F_SEAL_WRITE != 0
    }

    /// Sets the write seal bit.
    #[inline]
    pub fn set_write_seal(&mut self) {
        self.0 |= F_SEAL_WRITE;
    }

    /// True if the future write seal bit is present.
    #[inline]
    pub fn future_write_seal(self) -> bool {
        self.0 & F_SEAL_FUTURE_WRITE != 0
    }

    /// Sets the future write seal bit.
    #[inline]
    pub fn set_future_write_seal(&mut self) {
        self.0 |= F_SEAL_FUTURE_WRITE;
    }

    /// True of the seal seal bit is present.
    #[inline]
    pub fn seal_seal(self) -> bool {
        self.0 & F_SEAL_SEAL != 0
    }

    /// Sets the seal seal bit.
    #[inline]
    pub fn set_seal_seal(&mut self) {
        self.0 |= F_SEAL_SEAL;
    }

    /// True if either seal that blocks writable mappings is present.
    #[inline]
    pub fn blocks_writes(self) -> bool {
        self.write_seal() || self.future_write_seal()
    }
}

fn get_seals(descriptor: &dyn AsRawDescriptor) -> Result<MemfdSeals> {
    // SAFETY:
    // Safe because F_GET_SEALS only reads the seals of the descriptor.
    let ret = syscall!(unsafe { fcntl(descriptor.as_raw_descriptor(), F_GET_SEALS) })?;
    Ok(MemfdSeals(ret))
}

fn add_seals(descriptor: &dyn AsRawDescriptor, seals: MemfdSeals) -> Result<()> {
    // SAFETY:
    // Safe because F_ADD_SEALS does not touch our memory and we check the return value.
    syscall!(unsafe { fcntl(descriptor.as_raw_descriptor(), F_ADD_SEALS, seals.bitmask()) })?;
    Ok(())
}

/// The memfd behind a region.
#[derive(Debug)]
pub struct PlatformHandle {
    fd: SafeDescriptor,
}

impl PlatformHandle {
    /// Wraps a memfd received from elsewhere. Use `SharedMemoryRegion::take` to check it.
    pub fn new(fd: SafeDescriptor) -> PlatformHandle {
        PlatformHandle { fd }
    }

    pub fn into_descriptor(self) -> SafeDescriptor {
        self.fd
    }

    /// Gets the memfd seals currently applied to the object.
    pub fn seals(&self) -> Result<MemfdSeals> {
        get_seals(&self.fd)
    }
}

impl AsRawDescriptors for PlatformHandle {
    fn as_raw_descriptors(&self) -> Vec<RawDescriptor> {
        vec![self.fd.as_raw_descriptor()]
    }
}

impl RegionHandle for PlatformHandle {
    fn allocate(mode: Mode, size: usize) -> Result<PlatformHandle> {
        // SAFETY:
        // Safe because we give a valid C string and check the results of the memfd_create call.
        let fd = syscall!(unsafe {
            memfd_create(
                MEMFD_NAME.as_ptr() as *const c_char,
                MFD_CLOEXEC | MFD_ALLOW_SEALING,
            )
        })?;
        // SAFETY:
        // Safe because memfd_create just returned this descriptor and nothing else owns it.
        let fd = unsafe { SafeDescriptor::from_raw_descriptor(fd) };

        // SAFETY:
        // Safe because ftruncate64 doesn't touch our memory and we check the result.
        syscall!(unsafe { ftruncate64(fd.as_raw_descriptor(), size as off64_t) })?;

        let mut seals = MemfdSeals::new();
        seals.set_grow_seal();
        seals.set_shrink_seal();
        if mode == Mode::Unsafe {
            seals.set_seal_seal();
        }
        add_seals(&fd, seals)?;
        Ok(PlatformHandle { fd })
    }

    fn duplicate(&self) -> Result<PlatformHandle> {
        Ok(PlatformHandle {
            fd: self.fd.try_clone()?,
        })
    }

    fn convert_to_read_only(&mut self) -> Result<()> {
        let mut seals = MemfdSeals::new();
        seals.set_future_write_seal();
        seals.set_seal_seal();
        match add_seals(&self.fd, seals) {
            // Kernels before 5.1 do not know F_SEAL_FUTURE_WRITE. F_SEAL_WRITE gives the same
            // guarantee but fails with EBUSY while writable mappings exist.
            Err(e) if e.errno() == EINVAL => {
                warn!("F_SEAL_FUTURE_WRITE unsupported, falling back to F_SEAL_WRITE");
                let mut seals = MemfdSeals::new();
                seals.set_write_seal();
                seals.set_seal_seal();
                add_seals(&self.fd, seals)
            }
            r => r,
        }
    }

    fn convert_to_unsafe(&mut self) -> Result<()> {
        let mut seals = MemfdSeals::new();
        seals.set_seal_seal();
        add_seals(&self.fd, seals)
    }

    fn check_permissions(&self, mode: Mode, size: usize) -> bool {
        let (access, seals, object_size) = match (
            access_mode(&self.fd),
            get_seals(&self.fd),
            object_size(&self.fd),
        ) {
            (Ok(access), Ok(seals), Ok(object_size)) => (access, seals, object_size),
            (access, seals, object_size) => {
                error!(
                    "failed to query memfd: access={:?} seals={:?} size={:?}",
                    access, seals, object_size
                );
                return false;
            }
        };
        if object_size < size as u64 {
            error!(
                "memfd spans {} bytes, less than the region size {}",
                object_size, size
            );
            return false;
        }
        // A writable or unsafe region must still be able to write. Only a writable region may
        // later be downgraded, which requires the seal set to be open.
        let matches = match mode {
            Mode::ReadOnly => seals.blocks_writes(),
            Mode::Writable => access == O_RDWR && !seals.blocks_writes() && !seals.seal_seal(),
            Mode::Unsafe => access == O_RDWR && !seals.blocks_writes() && seals.seal_seal(),
        };
        if !matches {
            error!(
                "memfd access mode {:#x} and seals {:#x} do not correspond to {} mode",
                access,
                seals.bitmask(),
                mode
            );
        }
        matches
    }

    fn descriptor(&self) -> &SafeDescriptor {
        &self.fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_allocation_leaves_seal_set_open() {
        let handle = PlatformHandle::allocate(Mode::Writable, 4096).unwrap();
        let seals = handle.seals().unwrap();
        assert!(seals.grow_seal());
        assert!(seals.shrink_seal());
        assert!(!seals.seal_seal());
        assert!(!seals.blocks_writes());
        assert_eq!(object_size(&handle.fd).unwrap(), 4096);
    }

    #[test]
    fn unsafe_allocation_closes_seal_set() {
        let handle = PlatformHandle::allocate(Mode::Unsafe, 4096).unwrap();
        let seals = handle.seals().unwrap();
        assert!(seals.seal_seal());
        assert!(!seals.blocks_writes());
        // Nobody can downgrade an unsafe region behind its other holders' backs.
        let mut seals = MemfdSeals::new();
        seals.set_future_write_seal();
        add_seals(&handle.fd, seals).unwrap_err();
    }

    #[test]
    fn read_only_conversion_seals_writes() {
        let mut handle = PlatformHandle::allocate(Mode::Writable, 4096).unwrap();
        handle.convert_to_read_only().unwrap();
        let seals = handle.seals().unwrap();
        assert!(seals.blocks_writes());
        assert!(seals.seal_seal());
    }

    #[test]
    fn duplicate_shares_seals() {
        let mut handle = PlatformHandle::allocate(Mode::Writable, 4096).unwrap();
        handle.convert_to_read_only().unwrap();
        let dup = handle.duplicate().unwrap();
        assert_eq!(dup.fd, handle.fd);
        assert!(dup.seals().unwrap().blocks_writes());
    }

    #[test]
    fn non_memfd_fails_permission_check() {
        let mut fds = [0; 2];
        // SAFETY:
        // Safe because we pass a valid two element array and check the result.
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY:
        // The pipe call just returned these descriptors to us.
        let (read, _write) = unsafe {
            (
                SafeDescriptor::from_raw_descriptor(fds[0]),
                SafeDescriptor::from_raw_descriptor(fds[1]),
            )
        };
        let handle = PlatformHandle::new(read);
        assert!(!handle.check_permissions(Mode::ReadOnly, 1));
        assert!(!handle.check_permissions(Mode::Unsafe, 1));
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#![cfg(unix)]

use std::ptr::null_mut;

use shm_region::AsRawDescriptor;
use shm_region::Mode;
use shm_region::RawDescriptor;
use shm_region::RegionHandle;
use shm_region::SharedMemoryRegion;

const REGION_SIZE: usize = 4096;

/// Tries to create a shared writable mapping of `descriptor` behind the crate's back.
fn can_map_writable(descriptor: RawDescriptor, size: usize) -> bool {
    // SAFETY:
    // Safe because we let the kernel pick the address and unmap whatever it returns.
    unsafe {
        let addr = libc::mmap(
            null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            descriptor,
            0,
        );
        if addr == libc::MAP_FAILED {
            return false;
        }
        libc::munmap(addr, size);
    }
    true
}

fn raw_descriptor(region: &SharedMemoryRegion) -> RawDescriptor {
    region
        .platform_handle()
        .unwrap()
        .descriptor()
        .as_raw_descriptor()
}

#[test]
fn writable_region_maps_writable() {
    let region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
    assert!(can_map_writable(raw_descriptor(&region), REGION_SIZE));
}

#[test]
fn read_only_handle_is_not_writable() {
    let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
    region.convert_to_read_only().unwrap();
    assert_eq!(region.mode(), Mode::ReadOnly);
    assert!(!can_map_writable(raw_descriptor(&region), REGION_SIZE));
}

#[test]
fn duplicated_read_only_handle_is_not_writable() {
    let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
    region.convert_to_read_only().unwrap();
    let dup = region.duplicate().unwrap();
    assert!(!can_map_writable(raw_descriptor(&dup), REGION_SIZE));
}

#[cfg(any(target_os = "android", target_os = "linux"))]
mod linux {
    use std::ffi::CString;

    use shm_region::FromRawDescriptor;
    use shm_region::IntoRawDescriptor;
    use shm_region::PlatformHandle;
    use shm_region::RegionError;
    use shm_region::SafeDescriptor;

    use super::*;

    #[test]
    fn failed_conversion_leaves_region_writable() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        let guid = region.guid();
        // Closing the seal set makes the kernel refuse the read-only seals with EPERM.
        // SAFETY:
        // Safe because F_ADD_SEALS does not touch our memory.
        let ret = unsafe {
            libc::fcntl(
                raw_descriptor(&region),
                libc::F_ADD_SEALS,
                libc::F_SEAL_SEAL,
            )
        };
        assert_eq!(ret, 0);

        match region.convert_to_read_only() {
            Err(RegionError::Convert { mode, err }) => {
                assert_eq!(mode, Mode::ReadOnly);
                assert_eq!(err.errno(), libc::EPERM);
            }
            r => panic!("unexpected conversion result: {:?}", r),
        }
        assert!(region.is_valid());
        assert_eq!(region.mode(), Mode::Writable);
        assert_eq!(region.size(), REGION_SIZE);
        assert_eq!(region.guid(), guid);

        let mapping = region.map().unwrap();
        mapping.write_obj(0xabcd_u16, 0).unwrap();
        assert_eq!(mapping.read_obj::<u16>(0).unwrap(), 0xabcd);
    }

    #[test]
    fn raw_descriptor_hand_off() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        region.map().unwrap().write_obj(0x1122_3344_u32, 8).unwrap();
        region.convert_to_read_only().unwrap();
        let (handle, header) = region.into_parts().unwrap();
        let raw = handle.into_descriptor().into_raw_descriptor();

        // SAFETY:
        // `raw` was released by `into_raw_descriptor` above and nothing else owns it.
        let fd = unsafe { SafeDescriptor::from_raw_descriptor(raw) };
        let region = SharedMemoryRegion::from_parts(PlatformHandle::new(fd), header).unwrap();
        assert_eq!(region.mode(), Mode::ReadOnly);
        assert_eq!(region.map().unwrap().read_obj::<u32>(8).unwrap(), 0x1122_3344);
    }

    #[test]
    fn reopened_read_only_memfd_is_not_writable() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        region.convert_to_read_only().unwrap();

        let path = CString::new(format!("/proc/self/fd/{}", raw_descriptor(&region))).unwrap();
        // SAFETY:
        // Safe because `path` is a valid C string and we check the result.
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        assert!(fd >= 0, "failed to reopen memfd");
        // SAFETY:
        // open just returned this descriptor to us.
        let reopened = unsafe { SafeDescriptor::from_raw_descriptor(fd) };
        assert!(!can_map_writable(reopened.as_raw_descriptor(), REGION_SIZE));

        let buf = [0u8; 8];
        // SAFETY:
        // Safe because we write from a valid buffer of the given length.
        let ret = unsafe {
            libc::write(
                reopened.as_raw_descriptor(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
            )
        };
        assert!(ret < 0);
    }

    #[test]
    fn unsafe_region_cannot_be_sealed_later() {
        let region = SharedMemoryRegion::create_unsafe(REGION_SIZE).unwrap();
        let seals = region.platform_handle().unwrap().seals().unwrap();
        assert!(seals.seal_seal());
        // SAFETY:
        // Safe because F_ADD_SEALS does not touch our memory.
        let ret = unsafe {
            libc::fcntl(
                raw_descriptor(&region),
                libc::F_ADD_SEALS,
                libc::F_SEAL_FUTURE_WRITE,
            )
        };
        assert!(ret < 0);
        assert!(can_map_writable(raw_descriptor(&region), REGION_SIZE));
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;

    #[test]
    fn convert_to_read_only_invalidates_second_handle() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        assert!(region
            .platform_handle()
            .unwrap()
            .read_only_descriptor()
            .is_some());
        region.convert_to_read_only().unwrap();
        assert!(region
            .platform_handle()
            .unwrap()
            .read_only_descriptor()
            .is_none());
    }

    #[test]
    fn convert_to_unsafe_invalidates_second_handle() {
        let mut region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        region.convert_to_unsafe().unwrap();
        assert!(region
            .platform_handle()
            .unwrap()
            .read_only_descriptor()
            .is_none());
        assert!(can_map_writable(raw_descriptor(&region), REGION_SIZE));
    }

    #[test]
    fn writable_region_read_only_descriptor_cannot_map_writable() {
        let region = SharedMemoryRegion::create_writable(REGION_SIZE).unwrap();
        let readonly = region
            .platform_handle()
            .unwrap()
            .read_only_descriptor()
            .unwrap()
            .as_raw_descriptor();
        assert!(!can_map_writable(readonly, REGION_SIZE));
    }
}

//! `/dev/mem` backed register blocks
//!
//! Each block is mapped separately at page granularity with
//! `MAP_SHARED`, so writes go straight to the peripheral.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

use super::{Block, RegisterIo, BLOCK_SIZE};
use crate::error::InitError;

/// Open the memory device for read/write with caching disabled
pub fn open(path: &Path) -> Result<File, InitError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(path)
        .map_err(|source| InitError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// One mapped register block
pub struct DevMemBlock {
    block: Block,
    base: NonNull<u32>,
}

// The mapping is process-wide device memory; access is serialised by the
// per-block mutex in `Peripherals`.
unsafe impl Send for DevMemBlock {}

/// Map `BLOCK_SIZE` bytes of `device` at physical `address`
pub fn map(device: &File, block: Block, address: u64) -> Result<DevMemBlock, InitError> {
    let raw = unsafe { mmap_at(device.as_raw_fd(), address) };
    if raw == libc::MAP_FAILED {
        return Err(InitError::Map {
            block,
            address,
            source: io::Error::last_os_error(),
        });
    }
    let base = NonNull::new(raw as *mut u32).ok_or_else(|| InitError::Map {
        block,
        address,
        source: io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"),
    })?;
    Ok(DevMemBlock { block, base })
}

// Peripheral addresses above 2 GiB do not fit a 32-bit off_t, so use the
// 64-bit entry point where the C library has one.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe fn mmap_at(fd: libc::c_int, address: u64) -> *mut libc::c_void {
    libc::mmap64(
        ptr::null_mut(),
        BLOCK_SIZE,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        address as libc::off64_t,
    )
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
unsafe fn mmap_at(fd: libc::c_int, address: u64) -> *mut libc::c_void {
    libc::mmap(
        ptr::null_mut(),
        BLOCK_SIZE,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        address as libc::off_t,
    )
}

impl RegisterIo for DevMemBlock {
    fn read(&mut self, offset: usize) -> u32 {
        debug_assert!(offset % 4 == 0 && offset < BLOCK_SIZE);
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset / 4)) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        debug_assert!(offset % 4 == 0 && offset < BLOCK_SIZE);
        log::trace!("{} +{:#04x} <- {:#010x}", self.block, offset, value);
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset / 4), value) }
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        let rc = unsafe { libc::munmap(self.base.as_ptr() as *mut libc::c_void, BLOCK_SIZE) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

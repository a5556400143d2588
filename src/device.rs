// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Physical device backend.
//!
//! # Platform Support
//!
//! ## Linux
//! The driver exposes one character device per card (e.g. `/dev/cfo0`).
//! Ring state is exchanged through ioctls and the ring regions are mapped
//! from the same file descriptor at per-ring page offsets.
//!
//! ## Other platforms
//! There is no driver; opening a device returns `PlatformNotSupported`.
//! Use the simulated backend instead.

use crate::backend::DeviceBackend;
use crate::descriptor::RegAccessArgs;
use crate::error::{DmaError, DmaResult};
use crate::region::{MappedRegion, RegionKind};
use crate::ring::{RingKey, RingState};
use std::io;
use std::path::{Path, PathBuf};

/// Default device node of the first card.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/cfo0";

/// Check whether a device node exists at `path`.
///
/// This is a quick presence check; it does not open the device.
pub fn is_device_available(path: &Path) -> bool {
    path.exists()
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use crate::command::DriverCommand;
    use crate::descriptor::{pack_give, pack_xmit, ChannelInfoArgs};
    use crate::ring::MAX_CHANNELS;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    /// Handle to an open CFO/DTC device.
    ///
    /// Owns the file descriptor and every ring region mapped from it. Regions
    /// are unmapped before the descriptor is closed.
    pub struct PhysicalDevice {
        /// Mapped regions, indexed by ring then region kind.
        regions: Vec<[Option<MappedRegion>; 2]>,
        /// Device file handle.
        file: File,
        /// Path the device was opened from.
        path: PathBuf,
        /// System page size, the unit of mmap offsets.
        page_size: u64,
    }

    impl PhysicalDevice {
        /// Open the device node.
        ///
        /// # Errors
        ///
        /// Returns `PermissionDenied` or `DeviceOpen`; both are fatal.
        pub fn open(path: &Path) -> DmaResult<Self> {
            let file = File::options()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    if e.kind() == io::ErrorKind::PermissionDenied {
                        DmaError::PermissionDenied(path.display().to_string())
                    } else {
                        DmaError::DeviceOpen {
                            path: path.display().to_string(),
                            source: e,
                        }
                    }
                })?;

            let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
                n if n > 0 => n as u64,
                _ => 4096,
            };

            log::info!("opened {} (page size {})", path.display(), page_size);

            Ok(Self {
                regions: (0..MAX_CHANNELS * 2).map(|_| [None, None]).collect(),
                file,
                path: path.to_path_buf(),
                page_size,
            })
        }

        /// Path of the device node.
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn ioctl_arg(&self, command: DriverCommand, arg: u32) -> io::Result<()> {
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    command.request() as _,
                    arg as libc::c_ulong,
                )
            };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }

        fn ioctl_ptr<T>(&self, command: DriverCommand, arg: &mut T) -> io::Result<()> {
            let rc = unsafe {
                libc::ioctl(self.file.as_raw_fd(), command.request() as _, arg as *mut T)
            };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    impl DeviceBackend for PhysicalDevice {
        fn describe(&self) -> String {
            format!("physical device {}", self.path.display())
        }

        fn query(&mut self, key: RingKey, timeout_ms: u32) -> io::Result<Option<RingState>> {
            let mut args = ChannelInfoArgs::query(key, timeout_ms);
            match self.ioctl_ptr(DriverCommand::GetInfo, &mut args) {
                Ok(()) => Ok(Some(args.state())),
                Err(e) => match e.raw_os_error() {
                    Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => Ok(None),
                    _ => Err(e),
                },
            }
        }

        fn give(&mut self, key: RingKey, count: u32) -> io::Result<()> {
            self.ioctl_arg(DriverCommand::BufGive, pack_give(key, count))
        }

        fn transmit(&mut self, channel: usize, length: usize) -> io::Result<()> {
            self.ioctl_arg(DriverCommand::BufXmit, pack_xmit(channel, length))
        }

        fn register_access(&mut self, args: RegAccessArgs) -> io::Result<u32> {
            let mut args = args;
            self.ioctl_ptr(DriverCommand::RegAccess, &mut args)?;
            Ok(args.val)
        }

        fn map_region(&mut self, key: RingKey, kind: RegionKind, len: usize) -> DmaResult<()> {
            let region = MappedRegion::map(&self.file, key, kind, len, self.page_size)?;
            log::debug!("mapped {} region of {} ({} bytes)", kind, key, len);
            self.regions[key.index()][kind as usize] = Some(region);
            Ok(())
        }

        fn region(&self, key: RingKey, kind: RegionKind) -> Option<&MappedRegion> {
            self.regions.get(key.index())?[kind as usize].as_ref()
        }

        fn region_mut(&mut self, key: RingKey, kind: RegionKind) -> Option<&mut MappedRegion> {
            self.regions.get_mut(key.index())?[kind as usize].as_mut()
        }
    }

    impl Drop for PhysicalDevice {
        fn drop(&mut self) {
            // Unmap before the file descriptor goes away.
            self.regions.clear();
            log::info!("closed {}", self.path.display());
        }
    }
}

// ============================================================================
// Unsupported Platform Stub
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Stub device for platforms without the driver.
    ///
    /// `open` always fails with `DmaError::PlatformNotSupported`.
    pub struct PhysicalDevice {
        _private: (),
    }

    impl PhysicalDevice {
        pub fn open(_path: &Path) -> DmaResult<Self> {
            Err(DmaError::PlatformNotSupported)
        }

        pub fn path(&self) -> &Path {
            Path::new("")
        }
    }

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "no CFO/DTC driver on this platform")
    }

    impl DeviceBackend for PhysicalDevice {
        fn describe(&self) -> String {
            "unsupported physical device".to_string()
        }

        fn query(&mut self, _key: RingKey, _timeout_ms: u32) -> io::Result<Option<RingState>> {
            Err(unsupported())
        }

        fn give(&mut self, _key: RingKey, _count: u32) -> io::Result<()> {
            Err(unsupported())
        }

        fn transmit(&mut self, _channel: usize, _length: usize) -> io::Result<()> {
            Err(unsupported())
        }

        fn register_access(&mut self, _args: RegAccessArgs) -> io::Result<u32> {
            Err(unsupported())
        }

        fn map_region(&mut self, _key: RingKey, _kind: RegionKind, _len: usize) -> DmaResult<()> {
            Err(DmaError::PlatformNotSupported)
        }

        fn region(&self, _key: RingKey, _kind: RegionKind) -> Option<&MappedRegion> {
            None
        }

        fn region_mut(&mut self, _key: RingKey, _kind: RegionKind) -> Option<&mut MappedRegion> {
            None
        }
    }
}

// Re-export the appropriate implementation
#[cfg(target_os = "linux")]
pub use linux_impl::PhysicalDevice;

#[cfg(not(target_os = "linux"))]
pub use stub_impl::PhysicalDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_unavailable() {
        assert!(!is_device_available(Path::new("/dev/cfo-does-not-exist")));
    }

    #[test]
    fn test_open_missing_device_is_fatal() {
        let err = match PhysicalDevice::open(Path::new("/dev/cfo-does-not-exist")) {
            Ok(_) => panic!("opening a missing device must fail"),
            Err(e) => e,
        };
        assert!(err.is_fatal());
        #[cfg(target_os = "linux")]
        assert!(matches!(err, DmaError::DeviceOpen { .. }));
        #[cfg(not(target_os = "linux"))]
        assert!(matches!(err, DmaError::PlatformNotSupported));
    }
}

// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Ring memory regions.
//!
//! Each ring owns two regions: a data region of `slot_count` payload slots
//! and a metadata region holding one `i32` byte count per slot. On the
//! physical backend both are memory-mapped from the device file; the
//! simulator backs them with heap memory. Either way all access goes through
//! bounds-checked slot accessors.

use crate::error::{DmaError, DmaResult};
use crate::ring::RingKey;
use bitflags::bitflags;
use std::fmt;

#[cfg(target_os = "linux")]
use std::fs::File;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;
#[cfg(target_os = "linux")]
use std::ptr::NonNull;

const META_ENTRY_SIZE: usize = std::mem::size_of::<i32>();

bitflags! {
    /// Protection requested for a region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAccess: u32 {
        /// Software reads the region.
        const READ = 1 << 0;
        /// Software writes the region.
        const WRITE = 1 << 1;
    }
}

impl RegionAccess {
    /// Convert to `mmap` protection bits.
    #[cfg(target_os = "linux")]
    pub fn prot(self) -> libc::c_int {
        let mut prot = libc::PROT_NONE;
        if self.contains(Self::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(Self::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        prot
    }
}

/// Which of the two regions of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RegionKind {
    /// Payload slots.
    Data = 0,
    /// Per-slot byte counts written by the device.
    Meta = 1,
}

impl RegionKind {
    pub const ALL: [RegionKind; 2] = [RegionKind::Data, RegionKind::Meta];

    /// Protection requested when mapping this region.
    pub fn access(self) -> RegionAccess {
        match self {
            Self::Data => RegionAccess::READ | RegionAccess::WRITE,
            Self::Meta => RegionAccess::READ,
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Meta => f.write_str("meta"),
        }
    }
}

/// Page index of a region inside the device file.
///
/// The driver lays regions out as `(channel << 2) | (direction << 1) | kind`
/// consecutive pages.
#[inline]
pub fn map_page(key: RingKey, kind: RegionKind) -> u64 {
    ((key.channel as u64) << 2) | ((key.direction.as_u32() as u64) << 1) | kind as u64
}

/// Byte offset passed to `mmap` for a region.
#[inline]
pub fn map_offset(key: RingKey, kind: RegionKind, page_size: u64) -> u64 {
    map_page(key, kind) * page_size
}

enum Storage {
    Owned(Vec<u8>),
    #[cfg(target_os = "linux")]
    Mapped { ptr: NonNull<u8>, len: usize },
}

/// One data or metadata region of a ring.
pub struct MappedRegion {
    key: RingKey,
    kind: RegionKind,
    access: RegionAccess,
    storage: Storage,
}

// SAFETY: a mapped region is only touched through `&self` / `&mut self` of
// its owner; the device side of the mapping does not depend on the thread.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Heap-backed region of `len` zeroed bytes, readable and writable.
    pub fn owned(key: RingKey, kind: RegionKind, len: usize) -> Self {
        Self {
            key,
            kind,
            access: RegionAccess::READ | RegionAccess::WRITE,
            storage: Storage::Owned(vec![0u8; len]),
        }
    }

    /// Restrict the access allowed through this handle.
    pub fn with_access(mut self, access: RegionAccess) -> Self {
        self.access = access;
        self
    }

    /// Map a region from the device file.
    ///
    /// # Errors
    ///
    /// Returns `DmaError::MmapFailed` if the length is zero or `mmap` fails.
    #[cfg(target_os = "linux")]
    pub fn map(
        file: &File,
        key: RingKey,
        kind: RegionKind,
        len: usize,
        page_size: u64,
    ) -> DmaResult<Self> {
        if len == 0 {
            return Err(DmaError::MmapFailed(format!(
                "zero-length {kind} region for {key}"
            )));
        }
        let offset = map_offset(key, kind, page_size);

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                kind.access().prot(),
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(DmaError::MmapFailed(format!(
                "{kind} region for {key} at offset {offset:#x}: {}",
                std::io::Error::last_os_error()
            )));
        }

        let ptr = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| DmaError::MmapFailed(format!("null {kind} mapping for {key}")))?;

        Ok(Self {
            key,
            kind,
            access: kind.access(),
            storage: Storage::Mapped { ptr, len },
        })
    }

    pub fn key(&self) -> RingKey {
        self.key
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Access allowed through this handle; a mapped region gets the
    /// protection it was mapped with.
    pub fn access(&self) -> RegionAccess {
        self.access
    }

    fn ensure_writable(&self) -> DmaResult<()> {
        if self.access.contains(RegionAccess::WRITE) {
            Ok(())
        } else {
            Err(DmaError::ReadOnlyRegion {
                key: self.key,
                kind: self.kind,
            })
        }
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(buf) => buf.len(),
            #[cfg(target_os = "linux")]
            Storage::Mapped { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(buf) => buf,
            // SAFETY: the mapping is valid for `len` bytes until drop.
            #[cfg(target_os = "linux")]
            Storage::Mapped { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    /// Mutable view of the whole region.
    ///
    /// # Errors
    ///
    /// Returns `DmaError::ReadOnlyRegion` unless the region allows writes.
    pub fn as_mut_slice(&mut self) -> DmaResult<&mut [u8]> {
        self.ensure_writable()?;
        Ok(match &mut self.storage {
            Storage::Owned(buf) => buf,
            // SAFETY: the mapping is valid for `len` bytes until drop.
            #[cfg(target_os = "linux")]
            Storage::Mapped { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        })
    }

    fn slot_range(&self, index: u32, slot_size: usize) -> DmaResult<std::ops::Range<usize>> {
        let start = index as usize * slot_size;
        let end = start + slot_size;
        if slot_size == 0 || end > self.len() {
            return Err(DmaError::InvalidArgument(format!(
                "slot {index} (size {slot_size}) outside {} region of {} ({} bytes)",
                self.kind,
                self.key,
                self.len()
            )));
        }
        Ok(start..end)
    }

    /// Borrow one slot.
    pub fn slot(&self, index: u32, slot_size: usize) -> DmaResult<&[u8]> {
        let range = self.slot_range(index, slot_size)?;
        Ok(&self.as_slice()[range])
    }

    /// Mutably borrow one slot.
    pub fn slot_mut(&mut self, index: u32, slot_size: usize) -> DmaResult<&mut [u8]> {
        let range = self.slot_range(index, slot_size)?;
        Ok(&mut self.as_mut_slice()?[range])
    }

    /// Read the byte count stored for `index` in a metadata region.
    pub fn read_count(&self, index: u32) -> DmaResult<i32> {
        let range = self.slot_range(index, META_ENTRY_SIZE)?;
        match &self.storage {
            Storage::Owned(buf) => {
                let mut raw = [0u8; META_ENTRY_SIZE];
                raw.copy_from_slice(&buf[range]);
                Ok(i32::from_le_bytes(raw))
            }
            // The device writes this memory behind our back.
            #[cfg(target_os = "linux")]
            Storage::Mapped { ptr, .. } => Ok(i32::from_le(unsafe {
                std::ptr::read_volatile(ptr.as_ptr().add(range.start) as *const i32)
            })),
        }
    }

    /// Store a byte count for `index` in a metadata region.
    pub fn write_count(&mut self, index: u32, count: i32) -> DmaResult<()> {
        let range = self.slot_range(index, META_ENTRY_SIZE)?;
        self.as_mut_slice()?[range].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Storage::Mapped { ptr, len } = &self.storage {
            log::debug!("unmapping {} region of {}", self.kind, self.key);
            unsafe {
                libc::munmap(ptr.as_ptr() as *mut libc::c_void, *len);
            }
        }
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Direction;

    #[test]
    fn test_map_offsets_are_distinct() {
        let page = 4096;
        let mut seen = std::collections::HashSet::new();
        for key in RingKey::all() {
            for kind in RegionKind::ALL {
                assert!(seen.insert(map_offset(key, kind, page)));
            }
        }
        assert_eq!(map_offset(RingKey::receive(0), RegionKind::Data, page), 0);
        assert_eq!(map_offset(RingKey::receive(0), RegionKind::Meta, page), page);
        assert_eq!(
            map_offset(RingKey::new(1, Direction::Transmit), RegionKind::Meta, page),
            7 * page
        );
    }

    #[test]
    fn test_region_access() {
        assert!(RegionKind::Data.access().contains(RegionAccess::WRITE));
        assert_eq!(RegionKind::Meta.access(), RegionAccess::READ);
    }

    #[test]
    fn test_slot_bounds() {
        let mut region = MappedRegion::owned(RingKey::transmit(0), RegionKind::Data, 4 * 16);
        assert_eq!(region.slot(3, 16).unwrap().len(), 16);
        assert!(region.slot(4, 16).is_err());
        assert!(region.slot(0, 0).is_err());

        region.slot_mut(2, 16).unwrap()[0] = 0xAB;
        assert_eq!(region.as_slice()[32], 0xAB);
    }

    #[test]
    fn test_meta_counts() {
        let mut meta = MappedRegion::owned(RingKey::receive(1), RegionKind::Meta, 4 * 4);
        meta.write_count(1, 1500).unwrap();
        meta.write_count(3, -1).unwrap();
        assert_eq!(meta.read_count(0).unwrap(), 0);
        assert_eq!(meta.read_count(1).unwrap(), 1500);
        assert_eq!(meta.read_count(3).unwrap(), -1);
        assert!(meta.read_count(4).is_err());
    }

    #[test]
    fn test_read_only_region_refuses_writes() {
        let key = RingKey::receive(0);
        let mut meta =
            MappedRegion::owned(key, RegionKind::Meta, 4 * 4).with_access(RegionKind::Meta.access());
        assert_eq!(meta.access(), RegionAccess::READ);

        assert!(matches!(
            meta.write_count(0, 64),
            Err(DmaError::ReadOnlyRegion {
                kind: RegionKind::Meta,
                ..
            })
        ));
        assert!(meta.slot_mut(0, 4).is_err());
        assert!(meta.as_mut_slice().is_err());

        // Reads stay available and see no change.
        assert_eq!(meta.read_count(0).unwrap(), 0);
        assert_eq!(meta.slot(0, 4).unwrap(), &[0u8; 4]);
    }
}

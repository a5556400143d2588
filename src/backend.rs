// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! The driver contract and the two implementations of it.
//!
//! [`DeviceBackend`] is the boundary between the ring logic in
//! [`DmaEngine`](crate::DmaEngine) and whatever fulfils the driver's ioctl
//! and mmap requests: the kernel driver ([`PhysicalDevice`]) or the
//! in-process [`SimulatedDevice`]. The engine runs the same code against
//! both, so the two paths are observably identical.

use crate::descriptor::RegAccessArgs;
use crate::device::PhysicalDevice;
use crate::error::DmaResult;
use crate::region::{MappedRegion, RegionKind};
use crate::ring::{RingKey, RingState};
use crate::sim::SimulatedDevice;
use std::io;

/// Requests the engine issues to the device driver.
///
/// Methods return the raw driver status as an `io::Result`; the engine adds
/// context and decides whether a failure is fatal.
pub trait DeviceBackend {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// GET_INFO. Returns `Ok(None)` when the driver timed out cleanly.
    fn query(&mut self, key: RingKey, timeout_ms: u32) -> io::Result<Option<RingState>>;

    /// BUF_GIVE: return `count` receive slots to the device.
    fn give(&mut self, key: RingKey, count: u32) -> io::Result<()>;

    /// BUF_XMIT: commit one transmit slot of `length` bytes.
    fn transmit(&mut self, channel: usize, length: usize) -> io::Result<()>;

    /// REG_ACCESS. Returns the value read, or the value written.
    fn register_access(&mut self, args: RegAccessArgs) -> io::Result<u32>;

    /// Establish a ring region of `len` bytes.
    fn map_region(&mut self, key: RingKey, kind: RegionKind, len: usize) -> DmaResult<()>;

    /// A previously established region.
    fn region(&self, key: RingKey, kind: RegionKind) -> Option<&MappedRegion>;

    /// A previously established region, mutably.
    fn region_mut(&mut self, key: RingKey, kind: RegionKind) -> Option<&mut MappedRegion>;
}

/// Backend selected when a handle is initialized.
///
/// The variant never changes for the lifetime of the handle.
pub enum Backend {
    Physical(PhysicalDevice),
    Simulated(Box<SimulatedDevice>),
}

impl Backend {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }

    pub fn device(&self) -> &dyn DeviceBackend {
        match self {
            Self::Physical(dev) => dev,
            Self::Simulated(sim) => sim.as_ref(),
        }
    }

    pub fn device_mut(&mut self) -> &mut dyn DeviceBackend {
        match self {
            Self::Physical(dev) => dev,
            Self::Simulated(sim) => sim.as_mut(),
        }
    }

    /// The simulator, when this is the simulated backend.
    pub fn simulator(&self) -> Option<&SimulatedDevice> {
        match self {
            Self::Simulated(sim) => Some(sim.as_ref()),
            Self::Physical(_) => None,
        }
    }

    /// The simulator, mutably.
    pub fn simulator_mut(&mut self) -> Option<&mut SimulatedDevice> {
        match self {
            Self::Simulated(sim) => Some(sim.as_mut()),
            Self::Physical(_) => None,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.device().describe())
    }
}

// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! In-process simulation of the CFO/DTC driver and card.
//!
//! The simulator answers the same driver requests as the kernel driver, with
//! the rings held in heap memory:
//! - Receive rings start empty (`hardware_index == software_index == 0`) and
//!   are filled by [`SimulatedDevice::inject`] or by transmit loopback.
//! - Transmit rings start with every usable slot free
//!   (`hardware_index == slot_count - 1`, `software_index == 0`). Committed
//!   slots are consumed at once unless auto-drain is turned off, in which
//!   case they stay pending until [`SimulatedDevice::drain_transmit`].
//!
//! Nothing here blocks: a query with a timeout returns the current state
//! immediately, since no other thread can produce data meanwhile.

use crate::backend::DeviceBackend;
use crate::descriptor::RegAccessArgs;
use crate::error::{DmaError, DmaResult};
use crate::region::{MappedRegion, RegionKind};
use crate::ring::{ChannelInfo, Direction, RingKey, RingState, MAX_CHANNELS};
use std::collections::{HashMap, VecDeque};
use std::io;

/// Default number of slots per simulated ring.
pub const DEFAULT_SIM_SLOT_COUNT: u32 = 32;

/// Default slot size of a simulated ring.
pub const DEFAULT_SIM_SLOT_SIZE: u32 = 0x8000;

/// Geometry and behaviour of the simulated card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Slots per ring.
    pub slot_count: u32,
    /// Bytes per slot.
    pub slot_size: u32,
    /// Consume committed transmit slots immediately.
    pub auto_drain: bool,
    /// Feed consumed transmit payloads back into the receive ring of the
    /// same channel.
    pub loopback: bool,
    /// Keep a copy of every consumed transmit payload.
    pub record_transmit: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SIM_SLOT_COUNT,
            slot_size: DEFAULT_SIM_SLOT_SIZE,
            auto_drain: true,
            loopback: true,
            record_transmit: false,
        }
    }
}

struct SimRing {
    /// Driver view: for receive rings `software_index` is the last slot given
    /// back, for transmit rings the next slot to be committed.
    info: ChannelInfo,
    data: MappedRegion,
    meta: MappedRegion,
    mapped: [bool; 2],
    /// Lengths of committed transmit slots the card has not consumed yet.
    pending: VecDeque<usize>,
}

impl SimRing {
    fn new(key: RingKey, config: &SimConfig) -> Self {
        let hardware_index = match key.direction {
            Direction::Receive => 0,
            Direction::Transmit => config.slot_count.saturating_sub(1),
        };
        let info = ChannelInfo {
            slot_count: config.slot_count,
            slot_size: config.slot_size,
            hardware_index,
            software_index: 0,
            released_index: 0,
            timeout_ms: 0,
        };
        Self {
            data: MappedRegion::owned(key, RegionKind::Data, info.data_len()),
            meta: MappedRegion::owned(key, RegionKind::Meta, info.meta_len()),
            info,
            mapped: [false; 2],
            pending: VecDeque::new(),
        }
    }

    fn state(&self) -> RingState {
        RingState {
            slot_count: self.info.slot_count,
            slot_size: self.info.slot_size,
            hardware_index: self.info.hardware_index,
            software_index: self.info.software_index,
        }
    }

    /// Filled receive slots not yet given back.
    fn filled(&self) -> u32 {
        self.info.ready_delta()
    }
}

/// Simulated card implementing the driver contract in memory.
pub struct SimulatedDevice {
    config: SimConfig,
    rings: Vec<SimRing>,
    registers: HashMap<u32, u32>,
    transmitted: Vec<Vec<Vec<u8>>>,
    fail_gives: u32,
    fail_commits: u32,
    fail_queries: u32,
    timeout_queries: u32,
    misreports: HashMap<RingKey, RingState>,
    queries: u64,
}

impl SimulatedDevice {
    /// Create a simulator with the default geometry.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a simulator with custom geometry and behaviour.
    pub fn with_config(config: SimConfig) -> Self {
        let rings = RingKey::all().map(|key| SimRing::new(key, &config)).collect();
        log::info!(
            "simulated device: {} channel(s), {} slots of {} bytes per ring",
            MAX_CHANNELS,
            config.slot_count,
            config.slot_size
        );
        Self {
            config,
            rings,
            registers: HashMap::new(),
            transmitted: vec![Vec::new(); MAX_CHANNELS],
            fail_gives: 0,
            fail_commits: 0,
            fail_queries: 0,
            timeout_queries: 0,
            misreports: HashMap::new(),
            queries: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn ring(&self, key: RingKey) -> io::Result<&SimRing> {
        self.rings
            .get(key.index())
            .filter(|_| key.channel < MAX_CHANNELS)
            .ok_or_else(|| invalid(format!("no ring {key}")))
    }

    fn ring_mut(&mut self, key: RingKey) -> io::Result<&mut SimRing> {
        if key.channel >= MAX_CHANNELS {
            return Err(invalid(format!("no ring {key}")));
        }
        self.rings
            .get_mut(key.index())
            .ok_or_else(|| invalid(format!("no ring {key}")))
    }

    /// Device-side state of a ring.
    pub fn ring_state(&self, key: RingKey) -> Option<RingState> {
        self.ring(key).ok().map(SimRing::state)
    }

    /// Let the card produce one receive buffer on `channel`.
    ///
    /// Returns `Ok(false)` if the ring is full (the card keeps one slot free
    /// as a guard) and the payload was dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is invalid or the payload does not fit
    /// in a slot.
    pub fn inject(&mut self, channel: usize, payload: &[u8]) -> DmaResult<bool> {
        let key = RingKey::receive(channel);
        let ring = self
            .ring_mut(key)
            .map_err(|_| DmaError::InvalidChannel(channel))?;
        let slot_size = ring.info.slot_size as usize;
        if payload.len() > slot_size {
            return Err(DmaError::BufferSizeMismatch {
                expected: slot_size,
                actual: payload.len(),
            });
        }
        if ring.filled() + 1 >= ring.info.slot_count {
            log::debug!("{key}: ring full, dropping {} byte payload", payload.len());
            return Ok(false);
        }

        let next = ring.info.advance(ring.info.hardware_index, 1);
        ring.data.slot_mut(next, slot_size)?[..payload.len()].copy_from_slice(payload);
        ring.meta.write_count(next, payload.len() as i32)?;
        ring.info.hardware_index = next;
        Ok(true)
    }

    /// Consume up to `count` pending transmit slots on `channel`.
    ///
    /// Only meaningful with auto-drain off. Returns the number consumed.
    pub fn drain_transmit(&mut self, channel: usize, count: u32) -> DmaResult<u32> {
        let mut drained = 0;
        while drained < count && self.consume_transmit(channel)? {
            drained += 1;
        }
        Ok(drained)
    }

    /// Number of committed transmit slots not yet consumed.
    pub fn pending_transmit(&self, channel: usize) -> usize {
        self.ring(RingKey::transmit(channel))
            .map(|ring| ring.pending.len())
            .unwrap_or(0)
    }

    /// Take the payloads consumed on `channel` so far.
    ///
    /// Only filled when `record_transmit` is enabled.
    pub fn take_transmitted(&mut self, channel: usize) -> Vec<Vec<u8>> {
        self.transmitted
            .get_mut(channel)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Turn transmit auto-drain on or off.
    pub fn set_auto_drain(&mut self, enabled: bool) {
        self.config.auto_drain = enabled;
    }

    /// Turn transmit loopback on or off.
    pub fn set_loopback(&mut self, enabled: bool) {
        self.config.loopback = enabled;
    }

    /// Make the next `count` BUF_GIVE commands fail.
    pub fn fail_next_gives(&mut self, count: u32) {
        self.fail_gives = count;
    }

    /// Make the next `count` BUF_XMIT commands fail.
    pub fn fail_next_commits(&mut self, count: u32) {
        self.fail_commits = count;
    }

    /// Make the next `count` GET_INFO commands fail.
    pub fn fail_next_queries(&mut self, count: u32) {
        self.fail_queries = count;
    }

    /// Make the next `count` GET_INFO commands time out without a state.
    pub fn timeout_next_queries(&mut self, count: u32) {
        self.timeout_queries = count;
    }

    /// Answer the next GET_INFO on `key` with `state` instead of the real
    /// ring state, as a misbehaving driver would.
    pub fn misreport_next_query(&mut self, key: RingKey, state: RingState) {
        self.misreports.insert(key, state);
    }

    /// Number of GET_INFO queries answered.
    pub fn query_count(&self) -> u64 {
        self.queries
    }

    fn consume_transmit(&mut self, channel: usize) -> DmaResult<bool> {
        let key = RingKey::transmit(channel);
        let ring = self
            .ring_mut(key)
            .map_err(|_| DmaError::InvalidChannel(channel))?;
        let Some(length) = ring.pending.pop_front() else {
            return Ok(false);
        };

        // Oldest pending slot: the commit cursor minus what is still queued.
        let queued = ring.pending.len() as u32 + 1;
        let slot = ring
            .info
            .advance(ring.info.software_index, ring.info.slot_count - queued);
        let payload = ring.data.slot(slot, ring.info.slot_size as usize)?[..length].to_vec();
        ring.info.hardware_index = ring.info.advance(ring.info.hardware_index, 1);

        if self.config.loopback && !self.inject(channel, &payload)? {
            log::warn!("ch{channel}: loopback dropped {length} byte payload, receive ring full");
        }
        if self.config.record_transmit {
            self.transmitted[channel].push(payload);
        }
        Ok(true)
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

impl DeviceBackend for SimulatedDevice {
    fn describe(&self) -> String {
        format!(
            "simulated device ({} slots x {} bytes)",
            self.config.slot_count, self.config.slot_size
        )
    }

    fn query(&mut self, key: RingKey, _timeout_ms: u32) -> io::Result<Option<RingState>> {
        self.queries += 1;
        if self.fail_queries > 0 {
            self.fail_queries -= 1;
            return Err(io::Error::other("simulated GET_INFO failure"));
        }
        if self.timeout_queries > 0 {
            self.timeout_queries -= 1;
            return Ok(None);
        }
        let state = self.ring(key)?.state();
        Ok(Some(self.misreports.remove(&key).unwrap_or(state)))
    }

    fn give(&mut self, key: RingKey, count: u32) -> io::Result<()> {
        if self.fail_gives > 0 {
            self.fail_gives -= 1;
            return Err(io::Error::other("simulated BUF_GIVE failure"));
        }
        if key.direction != Direction::Receive {
            return Err(invalid(format!("BUF_GIVE on transmit ring {key}")));
        }
        let ring = self.ring_mut(key)?;
        if count > ring.filled() {
            return Err(invalid(format!(
                "BUF_GIVE of {count} slot(s) on {key} with {} filled",
                ring.filled()
            )));
        }
        ring.info.software_index = ring.info.advance(ring.info.software_index, count);
        Ok(())
    }

    fn transmit(&mut self, channel: usize, length: usize) -> io::Result<()> {
        if self.fail_commits > 0 {
            self.fail_commits -= 1;
            return Err(io::Error::other("simulated BUF_XMIT failure"));
        }
        let ring = self.ring_mut(RingKey::transmit(channel))?;
        if length > ring.info.slot_size as usize {
            return Err(invalid(format!(
                "BUF_XMIT of {length} bytes exceeds slot size {}",
                ring.info.slot_size
            )));
        }
        if ring.pending.len() as u32 + 1 >= ring.info.slot_count {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "transmit ring full",
            ));
        }
        ring.pending.push_back(length);
        ring.info.software_index = ring.info.advance(ring.info.software_index, 1);

        if self.config.auto_drain {
            self.consume_transmit(channel)
                .map_err(|e| io::Error::other(e.to_string()))?;
        }
        Ok(())
    }

    fn register_access(&mut self, args: RegAccessArgs) -> io::Result<u32> {
        if args.is_write() {
            self.registers.insert(args.reg_offset, args.val);
            Ok(args.val)
        } else {
            Ok(self.registers.get(&args.reg_offset).copied().unwrap_or(0))
        }
    }

    fn map_region(&mut self, key: RingKey, kind: RegionKind, len: usize) -> DmaResult<()> {
        let ring = self
            .ring_mut(key)
            .map_err(|e| DmaError::MmapFailed(e.to_string()))?;
        let region = match kind {
            RegionKind::Data => &ring.data,
            RegionKind::Meta => &ring.meta,
        };
        if region.len() != len {
            return Err(DmaError::MmapFailed(format!(
                "{kind} region of {key} is {} bytes, {len} requested",
                region.len()
            )));
        }
        ring.mapped[kind as usize] = true;
        Ok(())
    }

    fn region(&self, key: RingKey, kind: RegionKind) -> Option<&MappedRegion> {
        let ring = self.ring(key).ok()?;
        if !ring.mapped[kind as usize] {
            return None;
        }
        Some(match kind {
            RegionKind::Data => &ring.data,
            RegionKind::Meta => &ring.meta,
        })
    }

    fn region_mut(&mut self, key: RingKey, kind: RegionKind) -> Option<&mut MappedRegion> {
        let ring = self.ring_mut(key).ok()?;
        if !ring.mapped[kind as usize] {
            return None;
        }
        Some(match kind {
            RegionKind::Data => &mut ring.data,
            RegionKind::Meta => &mut ring.meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimulatedDevice {
        SimulatedDevice::with_config(SimConfig {
            slot_count: 4,
            slot_size: 16,
            ..SimConfig::default()
        })
    }

    #[test]
    fn test_initial_indices() {
        let sim = small();
        let rx = sim.ring_state(RingKey::receive(0)).unwrap();
        assert_eq!((rx.hardware_index, rx.software_index), (0, 0));
        let tx = sim.ring_state(RingKey::transmit(1)).unwrap();
        assert_eq!((tx.hardware_index, tx.software_index), (3, 0));
        assert!(sim.ring_state(RingKey::receive(MAX_CHANNELS)).is_none());
    }

    #[test]
    fn test_inject_fills_until_guard_slot() {
        let mut sim = small();
        assert!(sim.inject(0, b"a").unwrap());
        assert!(sim.inject(0, b"bb").unwrap());
        assert!(sim.inject(0, b"ccc").unwrap());
        assert!(!sim.inject(0, b"dddd").unwrap());
        assert_eq!(sim.ring_state(RingKey::receive(0)).unwrap().hardware_index, 3);

        sim.give(RingKey::receive(0), 1).unwrap();
        assert!(sim.inject(0, b"dddd").unwrap());
        assert_eq!(sim.ring_state(RingKey::receive(0)).unwrap().hardware_index, 0);
    }

    #[test]
    fn test_inject_rejects_oversized_payload() {
        let mut sim = small();
        let err = sim.inject(0, &[0u8; 17]).unwrap_err();
        assert!(matches!(err, DmaError::BufferSizeMismatch { .. }));
        assert!(matches!(sim.inject(5, b"x"), Err(DmaError::InvalidChannel(5))));
    }

    #[test]
    fn test_give_validates_count() {
        let mut sim = small();
        sim.inject(1, b"x").unwrap();
        assert!(sim.give(RingKey::receive(1), 2).is_err());
        assert!(sim.give(RingKey::transmit(1), 1).is_err());
        sim.give(RingKey::receive(1), 1).unwrap();
        assert_eq!(sim.ring_state(RingKey::receive(1)).unwrap().software_index, 1);
    }

    #[test]
    fn test_injected_failures() {
        let mut sim = small();
        sim.inject(0, b"x").unwrap();
        sim.fail_next_gives(1);
        assert!(sim.give(RingKey::receive(0), 1).is_err());
        assert!(sim.give(RingKey::receive(0), 1).is_ok());

        sim.fail_next_commits(2);
        assert!(sim.transmit(0, 4).is_err());
        assert!(sim.transmit(0, 4).is_err());
        assert!(sim.transmit(0, 4).is_ok());
    }

    #[test]
    fn test_pending_transmit_without_auto_drain() {
        let mut sim = small();
        sim.set_auto_drain(false);
        sim.set_loopback(false);
        sim.transmit(0, 4).unwrap();
        sim.transmit(0, 4).unwrap();
        sim.transmit(0, 4).unwrap();
        assert_eq!(sim.pending_transmit(0), 3);
        assert!(sim.transmit(0, 4).is_err());

        let tx = sim.ring_state(RingKey::transmit(0)).unwrap();
        assert_eq!((tx.hardware_index, tx.software_index), (3, 3));

        assert_eq!(sim.drain_transmit(0, 2).unwrap(), 2);
        assert_eq!(sim.pending_transmit(0), 1);
        assert_eq!(sim.ring_state(RingKey::transmit(0)).unwrap().hardware_index, 1);
        assert_eq!(sim.drain_transmit(0, 5).unwrap(), 1);
    }

    #[test]
    fn test_register_round_trip() {
        let mut sim = small();
        assert_eq!(sim.register_access(RegAccessArgs::read(0x9100)).unwrap(), 0);
        sim.register_access(RegAccessArgs::write(0x9100, 0x1234_5678)).unwrap();
        assert_eq!(
            sim.register_access(RegAccessArgs::read(0x9100)).unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn test_regions_hidden_until_mapped() {
        let mut sim = small();
        let key = RingKey::receive(0);
        assert!(sim.region(key, RegionKind::Data).is_none());
        assert!(sim.map_region(key, RegionKind::Data, 10).is_err());
        sim.map_region(key, RegionKind::Data, 64).unwrap();
        assert_eq!(sim.region(key, RegionKind::Data).unwrap().len(), 64);
        assert!(sim.region(key, RegionKind::Meta).is_none());
    }

    #[test]
    fn test_query_counts() {
        let mut sim = small();
        sim.query(RingKey::receive(0), 10).unwrap();
        sim.query(RingKey::transmit(0), 0).unwrap();
        assert_eq!(sim.query_count(), 2);
    }

    #[test]
    fn test_query_hooks() {
        let mut sim = small();
        let key = RingKey::receive(0);

        sim.fail_next_queries(1);
        assert!(sim.query(key, 0).is_err());
        sim.timeout_next_queries(1);
        assert_eq!(sim.query(key, 10).unwrap(), None);

        let bogus = RingState {
            slot_count: 8,
            ..RingState::default()
        };
        sim.misreport_next_query(key, bogus);
        assert_eq!(sim.query(key, 0).unwrap(), Some(bogus));
        assert_eq!(sim.query(key, 0).unwrap().unwrap().slot_count, 4);
        assert_eq!(sim.query_count(), 4);
    }
}

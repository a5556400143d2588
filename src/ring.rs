// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Channel directory and circular index arithmetic.
//!
//! Every (channel, direction) pair is an independent ring of fixed-size
//! slots shared with the card. The device owns `hardware_index` and reports
//! it through queries; the engine owns `software_index` and moves it only
//! when it hands a slot to the caller (receive) or commits one (transmit).
//!
//! All distances are taken modulo `slot_count` and are never negative.

use std::fmt;

/// Number of DMA channels on the card (DAQ and DCS).
pub const MAX_CHANNELS: usize = 2;

/// Transfer direction of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum Direction {
    /// Card-to-software (C2S).
    Receive = 0,
    /// Software-to-card (S2C).
    Transmit = 1,
}

impl Direction {
    /// Both directions, receive first.
    pub const ALL: [Direction; 2] = [Direction::Receive, Direction::Transmit];

    /// Returns the direction as the driver's numeric code.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Receive => "C2S",
            Self::Transmit => "S2C",
        }
    }
}

/// Identifies one ring: a channel and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RingKey {
    pub channel: usize,
    pub direction: Direction,
}

impl RingKey {
    #[inline]
    pub const fn new(channel: usize, direction: Direction) -> Self {
        Self { channel, direction }
    }

    /// Receive ring of `channel`.
    #[inline]
    pub const fn receive(channel: usize) -> Self {
        Self::new(channel, Direction::Receive)
    }

    /// Transmit ring of `channel`.
    #[inline]
    pub const fn transmit(channel: usize) -> Self {
        Self::new(channel, Direction::Transmit)
    }

    /// Every ring on the card, ordered by channel then direction.
    pub fn all() -> impl Iterator<Item = RingKey> {
        (0..MAX_CHANNELS)
            .flat_map(|channel| Direction::ALL.into_iter().map(move |dir| RingKey::new(channel, dir)))
    }

    /// Dense index into per-ring tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.channel * 2 + self.direction as usize
    }
}

impl fmt::Display for RingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}/{}", self.channel, self.direction.name())
    }
}

/// Ring state as reported by a GET_INFO query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingState {
    pub slot_count: u32,
    pub slot_size: u32,
    pub hardware_index: u32,
    pub software_index: u32,
}

/// Cached configuration and cursors of one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    /// Number of slots in the ring.
    pub slot_count: u32,
    /// Size of one data slot in bytes.
    pub slot_size: u32,
    /// Last slot the device finished producing (receive) or consuming (transmit).
    pub hardware_index: u32,
    /// Last slot handed to software (receive) or next slot to fill (transmit).
    pub software_index: u32,
    /// Last slot given back to the device with BUF_GIVE (receive only).
    pub released_index: u32,
    /// Timeout passed through to the next query.
    pub timeout_ms: u32,
}

impl ChannelInfo {
    /// Build the cached entry from the first query of a ring.
    pub fn from_state(state: RingState, timeout_ms: u32) -> Self {
        Self {
            slot_count: state.slot_count,
            slot_size: state.slot_size,
            hardware_index: state.hardware_index,
            software_index: state.software_index,
            released_index: state.software_index,
            timeout_ms,
        }
    }

    /// Refresh the device-owned fields from a later query.
    ///
    /// The software cursors stay untouched: they belong to the engine.
    pub fn refresh(&mut self, state: RingState) {
        self.slot_count = state.slot_count;
        self.slot_size = state.slot_size;
        self.hardware_index = state.hardware_index;
    }

    /// Circular increment: `(index + by) mod slot_count`.
    #[inline]
    pub fn advance(&self, index: u32, by: u32) -> u32 {
        if self.slot_count == 0 {
            return 0;
        }
        ((u64::from(index) + u64::from(by)) % u64::from(self.slot_count)) as u32
    }

    /// Circular distance from `from` forward to `to`.
    #[inline]
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        if self.slot_count == 0 {
            return 0;
        }
        let n = u64::from(self.slot_count);
        ((u64::from(to) % n + n - u64::from(from) % n) % n) as u32
    }

    /// `(hardware_index - software_index) mod slot_count`.
    ///
    /// Receive: filled slots not yet handed out. Transmit: free slots.
    #[inline]
    pub fn ready_delta(&self) -> u32 {
        self.distance(self.software_index, self.hardware_index)
    }

    /// Filled receive slots that have not been given back to the device yet.
    #[inline]
    pub fn releasable(&self) -> u32 {
        self.distance(self.released_index, self.hardware_index)
    }

    /// Receive slots handed to software and not yet released.
    #[inline]
    pub fn outstanding(&self) -> u32 {
        self.distance(self.released_index, self.software_index)
    }

    /// Byte size of the data region.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.slot_count as usize * self.slot_size as usize
    }

    /// Byte size of the metadata region.
    #[inline]
    pub fn meta_len(&self) -> usize {
        self.slot_count as usize * std::mem::size_of::<i32>()
    }
}

impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slots={} size={} hw={} sw={} rel={} delta={} tmo={}ms",
            self.slot_count,
            self.slot_size,
            self.hardware_index,
            self.software_index,
            self.released_index,
            self.ready_delta(),
            self.timeout_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(slot_count: u32, hw: u32, sw: u32) -> ChannelInfo {
        ChannelInfo {
            slot_count,
            slot_size: 64,
            hardware_index: hw,
            software_index: sw,
            released_index: sw,
            timeout_ms: 0,
        }
    }

    #[test]
    fn test_advance_wraps() {
        let ring = info(4, 0, 0);
        assert_eq!(ring.advance(0, 1), 1);
        assert_eq!(ring.advance(3, 1), 0);
        assert_eq!(ring.advance(2, 7), 1);
        assert_eq!(ring.advance(u32::MAX, 1), ((u64::from(u32::MAX) + 1) % 4) as u32);
    }

    #[test]
    fn test_advance_composes() {
        for n in 1..=9u32 {
            let ring = info(n, 0, 0);
            for i in 0..n {
                for k1 in 0..2 * n {
                    for k2 in 0..2 * n {
                        assert_eq!(
                            ring.advance(ring.advance(i, k1), k2),
                            ring.advance(i, k1 + k2),
                            "n={n} i={i} k1={k1} k2={k2}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_ready_delta_bounds() {
        for n in 1..=8u32 {
            for hw in 0..n {
                for sw in 0..n {
                    let delta = info(n, hw, sw).ready_delta();
                    assert!(delta < n, "n={n} hw={hw} sw={sw} delta={delta}");
                    assert_eq!((sw + delta) % n, hw);
                }
            }
        }
    }

    #[test]
    fn test_ready_delta_wraps_backwards() {
        // Hardware behind software numerically: still a forward distance.
        assert_eq!(info(4, 1, 3).ready_delta(), 2);
        assert_eq!(info(4, 3, 0).ready_delta(), 3);
        assert_eq!(info(4, 2, 2).ready_delta(), 0);
    }

    #[test]
    fn test_releasable_and_outstanding() {
        let mut ring = info(8, 5, 1);
        ring.software_index = 3;
        assert_eq!(ring.ready_delta(), 2);
        assert_eq!(ring.outstanding(), 2);
        assert_eq!(ring.releasable(), 4);
        assert_eq!(ring.outstanding() + ring.ready_delta(), ring.releasable());
    }

    #[test]
    fn test_refresh_keeps_software_cursors() {
        let mut ring = info(4, 0, 2);
        ring.refresh(RingState {
            slot_count: 4,
            slot_size: 128,
            hardware_index: 3,
            software_index: 0,
        });
        assert_eq!(ring.hardware_index, 3);
        assert_eq!(ring.software_index, 2);
        assert_eq!(ring.slot_size, 128);
    }

    #[test]
    fn test_ring_keys() {
        let keys: Vec<RingKey> = RingKey::all().collect();
        assert_eq!(keys.len(), MAX_CHANNELS * 2);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
        assert_eq!(RingKey::receive(1).to_string(), "ch1/C2S");
        assert_eq!(RingKey::transmit(0).to_string(), "ch0/S2C");
    }

    #[test]
    fn test_region_lengths() {
        let ring = info(16, 0, 0);
        assert_eq!(ring.data_len(), 16 * 64);
        assert_eq!(ring.meta_len(), 16 * 4);
    }
}

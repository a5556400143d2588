// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Driver argument structures and packed command words.
//!
//! These structures match the layout the character-device driver copies in
//! and out for GET_INFO and REG_ACCESS. BUF_GIVE and BUF_XMIT take their
//! arguments packed into a single word.

use crate::ring::{RingKey, RingState};

/// GET_INFO argument: filled in by the caller (channel, direction, timeout)
/// and completed by the driver (geometry and indices).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ChannelInfoArgs {
    /// Channel number.
    pub chn: i32,
    /// Direction code (0 = C2S, 1 = S2C).
    pub dir: i32,
    /// Maximum time the driver may wait for new data.
    pub tmo_ms: i32,
    /// Number of slots in the ring.
    pub num_buffs: u32,
    /// Slot size in bytes.
    pub buff_size: u32,
    /// Hardware index.
    pub hw_idx: u32,
    /// Driver-side software index.
    pub sw_idx: u32,
}

impl ChannelInfoArgs {
    /// Create a query for `key`.
    pub fn query(key: RingKey, timeout_ms: u32) -> Self {
        Self {
            chn: key.channel as i32,
            dir: key.direction.as_u32() as i32,
            tmo_ms: timeout_ms.min(i32::MAX as u32) as i32,
            ..Self::default()
        }
    }

    /// Ring state as reported by the driver.
    pub fn state(&self) -> RingState {
        RingState {
            slot_count: self.num_buffs,
            slot_size: self.buff_size,
            hardware_index: self.hw_idx,
            software_index: self.sw_idx,
        }
    }
}

/// Register access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AccessType {
    Read = 0,
    Write = 1,
}

/// REG_ACCESS argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RegAccessArgs {
    /// Register offset in the device BAR.
    pub reg_offset: u32,
    /// 0 = read, 1 = write.
    pub access_type: u32,
    /// Value written, or value read back.
    pub val: u32,
}

impl RegAccessArgs {
    pub fn read(offset: u32) -> Self {
        Self {
            reg_offset: offset,
            access_type: AccessType::Read as u32,
            val: 0,
        }
    }

    pub fn write(offset: u32, value: u32) -> Self {
        Self {
            reg_offset: offset,
            access_type: AccessType::Write as u32,
            val: value,
        }
    }

    /// Returns true for a write access.
    pub fn is_write(&self) -> bool {
        self.access_type == AccessType::Write as u32
    }
}

/// Pack a BUF_GIVE argument: `(chn << 24) | (dir << 16) | (count & 0xffff)`.
#[inline]
pub fn pack_give(key: RingKey, count: u32) -> u32 {
    ((key.channel as u32) << 24) | (key.direction.as_u32() << 16) | (count & 0xffff)
}

/// Pack a BUF_XMIT argument: `(chn << 24) | (length & 0xffffff)`.
#[inline]
pub fn pack_xmit(channel: usize, length: usize) -> u32 {
    ((channel as u32) << 24) | (length as u32 & 0x00ff_ffff)
}

/// Largest count a single BUF_GIVE can carry.
pub const MAX_GIVE_COUNT: u32 = 0xffff;

/// Largest length a single BUF_XMIT can carry.
pub const MAX_XMIT_LENGTH: usize = 0x00ff_ffff;

// Compile-time size checks against the driver's structure layout
const _: () = assert!(std::mem::size_of::<ChannelInfoArgs>() == 28);
const _: () = assert!(std::mem::size_of::<RegAccessArgs>() == 12);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Direction;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<ChannelInfoArgs>(), 28);
        assert_eq!(std::mem::size_of::<RegAccessArgs>(), 12);
    }

    #[test]
    fn test_pack_give() {
        let arg = pack_give(RingKey::new(1, Direction::Receive), 5);
        assert_eq!(arg, 0x0100_0005);
        let arg = pack_give(RingKey::new(0, Direction::Transmit), 0x1_0003);
        assert_eq!(arg, 0x0001_0003);
    }

    #[test]
    fn test_pack_xmit() {
        assert_eq!(pack_xmit(1, 64), 0x0100_0040);
        assert_eq!(pack_xmit(0, MAX_XMIT_LENGTH), 0x00ff_ffff);
    }

    #[test]
    fn test_query_args() {
        let args = ChannelInfoArgs::query(RingKey::transmit(1), 250);
        assert_eq!((args.chn, args.dir, args.tmo_ms), (1, 1, 250));
        assert_eq!(args.state(), RingState::default());
    }

    #[test]
    fn test_reg_access_args() {
        assert!(!RegAccessArgs::read(0x9000).is_write());
        let write = RegAccessArgs::write(0x9004, 0xDEAD_BEEF);
        assert!(write.is_write());
        assert_eq!(write.val, 0xDEAD_BEEF);
    }
}

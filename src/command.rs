// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Driver command codes.
//!
//! These match the ioctl numbers exported by the CFO/DTC character-device
//! driver. Requests are encoded with the generic Linux `_IOC` layout.

use crate::descriptor::{ChannelInfoArgs, RegAccessArgs};

/// ioctl magic of the driver.
pub const IOC_MAGIC: u8 = b'm';

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Encode an ioctl request number.
pub const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

/// Commands understood by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DriverCommand {
    /// Query ring configuration and indices; may block up to a timeout.
    GetInfo = 0x05,

    /// Give consumed receive slots back to the device.
    BufGive = 0x06,

    /// Commit one filled transmit slot.
    BufXmit = 0x07,

    /// Read or write a device register.
    RegAccess = 0x08,
}

impl DriverCommand {
    /// Returns the command number as a u8 value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the full ioctl request number.
    pub const fn request(self) -> u32 {
        match self {
            Self::GetInfo => ioc(
                IOC_READ | IOC_WRITE,
                IOC_MAGIC,
                self.as_u8(),
                std::mem::size_of::<ChannelInfoArgs>(),
            ),
            Self::BufGive | Self::BufXmit => ioc(IOC_NONE, IOC_MAGIC, self.as_u8(), 0),
            Self::RegAccess => ioc(
                IOC_READ | IOC_WRITE,
                IOC_MAGIC,
                self.as_u8(),
                std::mem::size_of::<RegAccessArgs>(),
            ),
        }
    }

    /// Returns a human-readable name for the command.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetInfo => "GET_INFO",
            Self::BufGive => "BUF_GIVE",
            Self::BufXmit => "BUF_XMIT",
            Self::RegAccess => "REG_ACCESS",
        }
    }
}

impl std::fmt::Display for DriverCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_values() {
        assert_eq!(DriverCommand::GetInfo.as_u8(), 0x05);
        assert_eq!(DriverCommand::BufGive.as_u8(), 0x06);
        assert_eq!(DriverCommand::BufXmit.as_u8(), 0x07);
        assert_eq!(DriverCommand::RegAccess.as_u8(), 0x08);
    }

    #[test]
    fn test_request_encoding() {
        // _IO('m', 6)
        assert_eq!(DriverCommand::BufGive.request(), 0x0000_6d06);
        // _IOWR('m', 5, 28 bytes)
        assert_eq!(DriverCommand::GetInfo.request(), 0xc01c_6d05);
        // _IOWR('m', 8, 12 bytes)
        assert_eq!(DriverCommand::RegAccess.request(), 0xc00c_6d08);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(format!("{}", DriverCommand::BufXmit), "BUF_XMIT (0x07)");
    }
}

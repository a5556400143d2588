// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for DMA engine operations.

use crate::region::RegionKind;
use crate::ring::RingKey;
use thiserror::Error;

/// Errors that can occur during DMA engine operations.
///
/// Errors are split into two classes, see [`DmaError::is_fatal`]. A fatal
/// error means the device is broken or absent and no engine state can be
/// trusted any more; the caller is expected to abort. Everything else is
/// transient and may be retried or reported.
#[derive(Debug, Error)]
pub enum DmaError {
    /// The device special file could not be opened.
    #[error("failed to open device {path}: {source}")]
    DeviceOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Permission denied accessing the device file.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping of a ring region failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),

    /// A GET_INFO query failed for a reason other than a clean timeout.
    #[error("ring query failed for {key}: {source}")]
    QueryFailed {
        key: RingKey,
        #[source]
        source: std::io::Error,
    },

    /// The device stopped draining the transmit ring.
    #[error("transmit ring stalled on channel {channel}: no free slot after {waited_ms} ms")]
    TransmitStall { channel: usize, waited_ms: u64 },

    /// Release asked for more slots than the ring holds.
    #[error("release of {requested} slot(s) on channel {channel} unmet: only {available} releasable")]
    ReleaseUnmet {
        channel: usize,
        requested: u32,
        available: u32,
    },

    /// The driver rejected a BUF_GIVE command.
    #[error("BUF_GIVE failed on channel {channel}: {source}")]
    ReleaseFailed {
        channel: usize,
        #[source]
        source: std::io::Error,
    },

    /// The driver rejected every BUF_XMIT attempt.
    #[error("BUF_XMIT failed on channel {channel} after {attempts} attempt(s): {source}")]
    CommitFailed {
        channel: usize,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A REG_ACCESS command failed.
    #[error("register access at {offset:#06x} failed: {source}")]
    RegisterAccess {
        offset: u32,
        #[source]
        source: std::io::Error,
    },

    /// Channel number out of range.
    #[error("invalid channel {0}")]
    InvalidChannel(usize),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Buffer size mismatch.
    #[error("buffer size mismatch: expected at most {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Operation attempted on a closed handle.
    #[error("engine is closed")]
    Closed,

    /// Write attempted through a region mapped without write access.
    #[error("{kind} region of {key} is read-only")]
    ReadOnlyRegion { key: RingKey, kind: RegionKind },

    /// Platform not supported.
    #[error("platform not supported: the physical backend requires Linux")]
    PlatformNotSupported,
}

impl DmaError {
    /// Returns true if the error leaves the engine in an untrustworthy state.
    ///
    /// The library never terminates the process itself; callers escalate
    /// fatal errors (typically by aborting) and handle the rest.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpen { .. }
                | Self::PermissionDenied(_)
                | Self::MmapFailed(_)
                | Self::QueryFailed { .. }
                | Self::TransmitStall { .. }
                | Self::PlatformNotSupported
        )
    }
}

/// Result type alias for DMA engine operations.
pub type DmaResult<T> = Result<T, DmaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Direction;

    #[test]
    fn test_fatal_classification() {
        let stall = DmaError::TransmitStall {
            channel: 0,
            waited_ms: 1000,
        };
        assert!(stall.is_fatal());

        let query = DmaError::QueryFailed {
            key: RingKey::new(1, Direction::Receive),
            source: std::io::Error::from_raw_os_error(5),
        };
        assert!(query.is_fatal());

        let unmet = DmaError::ReleaseUnmet {
            channel: 0,
            requested: 3,
            available: 1,
        };
        assert!(!unmet.is_fatal());
        assert!(!DmaError::Closed.is_fatal());
        assert!(!DmaError::ReadOnlyRegion {
            key: RingKey::receive(0),
            kind: RegionKind::Meta,
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = DmaError::ReleaseUnmet {
            channel: 1,
            requested: 4,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "release of 4 slot(s) on channel 1 unmet: only 2 releasable"
        );
    }
}

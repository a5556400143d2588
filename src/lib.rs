// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # CFO/DTC DMA Ring-Buffer Engine
//!
//! Host-side engine for moving data between software and a PCIe
//! data-acquisition card (CFO/DTC class) through DMA ring buffers.
//!
//! The card exposes two channels. Each channel has a receive (card-to-software)
//! and a transmit (software-to-card) ring of fixed-size slots, plus a
//! metadata region carrying the byte count of every receive slot. The engine
//! tracks the software cursor of every ring, hands filled receive slots to the
//! caller, gives them back to the card, and commits outgoing payloads.
//!
//! ## Backends
//!
//! | Backend   | Selected by                 | Platform |
//! |-----------|-----------------------------|----------|
//! | Physical  | default                     | Linux    |
//! | Simulated | `CFOLIB_SIM_ENABLE` non-zero | any      |
//!
//! Both backends fulfil the same driver contract ([`DeviceBackend`]) and the
//! engine runs identical ring logic on top of them.
//!
//! ## Errors
//!
//! Every operation returns a [`DmaResult`]. Errors for which
//! [`DmaError::is_fatal`] is true mean the handle cannot continue; the
//! library never terminates the process itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cfo_dma::{DmaEngine, DmaError, SimConfig};
//!
//! fn main() -> Result<(), DmaError> {
//!     let mut engine = DmaEngine::simulated(SimConfig::default())?;
//!
//!     engine.send_buffer(0, b"Hello, CFO!")?;
//!     if let Some(buf) = engine.acquire_buffer(0, 100)? {
//!         println!("{:?}", engine.buffer(&buf)?);
//!         engine.release_buffers(0, 1)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Requirements (physical backend)
//!
//! - Linux with the CFO/DTC kernel driver loaded
//! - Read/write access to the device node (default `/dev/cfo0`)

// Module declarations
pub mod backend;
pub mod clock;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod engine;
pub mod error;
pub mod poll;
pub mod region;
pub mod ring;
pub mod sim;

// Re-exports for convenient access
pub use backend::{Backend, DeviceBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::DriverCommand;
pub use config::{EngineConfig, SimMode};
pub use device::{is_device_available, PhysicalDevice};
pub use engine::{DmaEngine, EngineStats, RxBuffer};
pub use error::{DmaError, DmaResult};
pub use region::{MappedRegion, RegionKind};
pub use ring::{ChannelInfo, Direction, RingKey, RingState, MAX_CHANNELS};
pub use sim::{SimConfig, SimulatedDevice};

// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! High-level DMA engine API.

use crate::backend::{Backend, DeviceBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, SimMode};
use crate::descriptor::{RegAccessArgs, MAX_GIVE_COUNT, MAX_XMIT_LENGTH};
use crate::device::PhysicalDevice;
use crate::error::{DmaError, DmaResult};
use crate::poll::{poll_until, retry, PollOutcome, RetryExhausted};
use crate::region::{MappedRegion, RegionKind};
use crate::ring::{ChannelInfo, Direction, RingKey, RingState, MAX_CHANNELS};
use crate::sim::{SimConfig, SimulatedDevice};
use std::io;
use std::sync::Arc;
use std::time::Instant;

/// A receive slot handed to the caller by [`DmaEngine::acquire_buffer`].
///
/// The slot belongs to the caller until it is released; after
/// [`DmaEngine::release_buffers`] covers it the device may overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxBuffer {
    /// Channel the buffer was received on.
    pub channel: usize,
    /// Slot index in the receive ring.
    pub slot: u32,
    /// Byte count the device wrote into the metadata region.
    pub byte_count: i32,
    /// Usable length: `byte_count` clamped to the slot size.
    pub len: usize,
}

/// Cumulative accounting of a handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Time spent inside engine operations.
    pub device_time_ns: u64,
    /// Bytes handed out by `acquire_buffer`.
    pub bytes_read: u64,
    /// Bytes committed by `send_buffer`.
    pub bytes_written: u64,
}

/// DMA ring-buffer engine for one CFO/DTC card.
///
/// `DmaEngine` owns the backend (kernel driver or simulator), a cached
/// [`ChannelInfo`] per ring, and the accounting counters. All operations are
/// synchronous and may block inside a driver query (bounded by the caller's
/// timeout) or inside the transmit watchdog (bounded by the configured
/// budget).
///
/// # Example
///
/// ```rust,no_run
/// use cfo_dma::{DmaEngine, DmaError, EngineConfig};
///
/// fn main() -> Result<(), DmaError> {
///     let mut engine = DmaEngine::open(EngineConfig::from_env())?;
///
///     engine.send_buffer(0, b"hello")?;
///     if let Some(buf) = engine.acquire_buffer(0, 100)? {
///         println!("received {} bytes", engine.buffer(&buf)?.len());
///         engine.release_buffers(0, 1)?;
///     }
///     Ok(())
/// }
/// ```
pub struct DmaEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    backend: Option<Backend>,
    rings: Vec<ChannelInfo>,
    buffers_held: u32,
    stats: EngineStats,
    closed: bool,
}

impl DmaEngine {
    /// Create an uninitialized handle.
    ///
    /// The backend is set up by [`init`](Self::init), or lazily by the first
    /// operation.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an uninitialized handle timed by `clock`.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            backend: None,
            rings: Vec::new(),
            buffers_held: 0,
            stats: EngineStats::default(),
            closed: false,
        }
    }

    /// Create and initialize a handle.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the device cannot be opened, queried or
    /// mapped.
    pub fn open(config: EngineConfig) -> DmaResult<Self> {
        let mut engine = Self::new(config);
        engine.init()?;
        Ok(engine)
    }

    /// Create and initialize a handle on a fresh simulator.
    pub fn simulated(sim: SimConfig) -> DmaResult<Self> {
        Self::open(EngineConfig::simulated(sim))
    }

    /// Create and initialize a handle on a prepared simulator.
    ///
    /// Receive data already injected into `sim` is drained like stale data on
    /// a real card.
    pub fn with_simulator(
        config: EngineConfig,
        sim: SimulatedDevice,
        clock: Arc<dyn Clock>,
    ) -> DmaResult<Self> {
        let mut engine = Self::with_clock(config.with_mode(SimMode::Enabled), clock);
        let start = engine.clock.now();
        let result = engine.init_backend(Backend::Simulated(Box::new(sim)));
        engine.account(start);
        result.map(|_| engine)
    }

    /// Initialize the handle: select the backend, query and map every ring,
    /// and drain stale receive data.
    ///
    /// Returns the mode that was applied. On a handle that is already set up
    /// this does nothing and returns the current mode.
    pub fn init(&mut self) -> DmaResult<SimMode> {
        if let Some(backend) = &self.backend {
            log::debug!("init on an initialized engine ({:?}), nothing to do", backend);
            return Ok(Self::mode_of(backend));
        }
        let start = self.clock.now();
        let result = self.init_inner();
        self.account(start);
        result
    }

    fn init_inner(&mut self) -> DmaResult<SimMode> {
        if self.closed {
            return Err(DmaError::Closed);
        }
        let backend = match self.config.mode {
            SimMode::Enabled => {
                Backend::Simulated(Box::new(SimulatedDevice::with_config(self.config.sim)))
            }
            SimMode::Disabled => {
                let path = &self.config.device_path;
                let device = PhysicalDevice::open(path)
                    .inspect_err(|e| log::error!("cannot open {}: {}", path.display(), e))?;
                Backend::Physical(device)
            }
        };
        self.init_backend(backend)
    }

    fn init_backend(&mut self, mut backend: Backend) -> DmaResult<SimMode> {
        let timeout_ms = self.config.initial_timeout_ms;
        let mut rings = Vec::with_capacity(MAX_CHANNELS * 2);

        for key in RingKey::all() {
            let state = match backend.device_mut().query(key, timeout_ms) {
                Ok(Some(state)) => state,
                Ok(None) => {
                    return Err(query_failed(
                        key,
                        io::Error::new(io::ErrorKind::TimedOut, "no ring state at init"),
                    ))
                }
                Err(source) => return Err(query_failed(key, source)),
            };
            validate_state(key, &state, None)?;

            let info = ChannelInfo::from_state(state, timeout_ms);
            log::debug!("{key}: {info}");

            for kind in RegionKind::ALL {
                let len = match kind {
                    RegionKind::Data => info.data_len(),
                    RegionKind::Meta => info.meta_len(),
                };
                backend
                    .device_mut()
                    .map_region(key, kind, len)
                    .inspect_err(|e| log::error!("{key}: {e}"))?;
            }
            rings.push(info);
        }

        let mode = Self::mode_of(&backend);
        log::info!("engine initialized on {:?}", backend);
        self.backend = Some(backend);
        self.rings = rings;
        self.buffers_held = 0;

        for channel in 0..MAX_CHANNELS {
            match self.release_all(channel) {
                Ok(0) => {}
                Ok(n) => log::info!("ch{channel}: drained {n} stale receive slot(s)"),
                Err(e) => log::warn!("ch{channel}: initial drain failed: {e}"),
            }
        }
        Ok(mode)
    }

    fn mode_of(backend: &Backend) -> SimMode {
        if backend.is_simulated() {
            SimMode::Enabled
        } else {
            SimMode::Disabled
        }
    }

    fn ensure_initialized(&mut self) -> DmaResult<()> {
        if self.closed {
            return Err(DmaError::Closed);
        }
        if self.backend.is_none() {
            self.init_inner()?;
        }
        Ok(())
    }

    /// Tear the handle down: unmap every region and close the device.
    ///
    /// Further operations return `DmaError::Closed`.
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            log::info!("closing engine on {:?}", backend);
        }
        self.rings.clear();
        self.buffers_held = 0;
        self.closed = true;
    }

    /// Returns true once the backend is set up.
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns true when running on the simulator.
    pub fn is_simulated(&self) -> bool {
        self.backend.as_ref().is_some_and(Backend::is_simulated)
    }

    /// The simulator, when running on it.
    pub fn simulator(&self) -> Option<&SimulatedDevice> {
        self.backend.as_ref()?.simulator()
    }

    /// The simulator, mutably, when running on it.
    pub fn simulator_mut(&mut self) -> Option<&mut SimulatedDevice> {
        self.backend.as_mut()?.simulator_mut()
    }

    /// Cumulative accounting.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Receive slots acquired and not yet released.
    pub fn buffers_held(&self) -> u32 {
        self.buffers_held
    }

    /// Cached state of a ring, if initialized.
    pub fn channel_info(&self, key: RingKey) -> Option<ChannelInfo> {
        self.rings.get(key.index()).copied()
    }

    /// Cached state of every ring.
    pub fn ring_snapshot(&self) -> Vec<(RingKey, ChannelInfo)> {
        RingKey::all().zip(self.rings.iter().copied()).collect()
    }

    /// Ready-delta of a ring from cached state; never queries.
    pub fn ready_delta(&self, key: RingKey) -> u32 {
        self.channel_info(key).map_or(0, |info| info.ready_delta())
    }

    /// Circular increment of `index` by `by` within the ring of `key`.
    pub fn advance(&self, key: RingKey, index: u32, by: u32) -> u32 {
        self.channel_info(key)
            .map_or(0, |info| info.advance(index, by))
    }

    /// Refresh a ring from the driver using its stored timeout.
    ///
    /// # Errors
    ///
    /// Any failure other than a clean timeout is fatal.
    pub fn query(&mut self, key: RingKey) -> DmaResult<ChannelInfo> {
        let start = self.clock.now();
        let result = self.ensure_initialized().and_then(|()| {
            let key = self.ring_key(key.channel, key.direction)?;
            let timeout_ms = self.rings[key.index()].timeout_ms;
            self.refresh(key, timeout_ms)
        });
        self.account(start);
        result
    }

    // ------------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------------

    /// Take the next filled receive slot of `channel`.
    ///
    /// If no slot is ready the driver is queried and may block for up to
    /// `timeout_ms`. Returns `Ok(None)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Query failures are fatal; see [`DmaError::is_fatal`].
    pub fn acquire_buffer(&mut self, channel: usize, timeout_ms: u32) -> DmaResult<Option<RxBuffer>> {
        let start = self.clock.now();
        let result = self.acquire_inner(channel, timeout_ms);
        if let Ok(Some(buf)) = &result {
            if buf.byte_count > 0 {
                self.stats.bytes_read += buf.byte_count as u64;
            }
        }
        self.account(start);
        result
    }

    fn acquire_inner(&mut self, channel: usize, timeout_ms: u32) -> DmaResult<Option<RxBuffer>> {
        self.ensure_initialized()?;
        let key = self.ring_key(channel, Direction::Receive)?;

        if self.rings[key.index()].ready_delta() == 0 {
            self.rings[key.index()].timeout_ms = timeout_ms;
            let info = self.refresh(key, timeout_ms)?;
            if info.ready_delta() == 0 {
                return Ok(None);
            }
        }

        let info = self.rings[key.index()];
        let next = info.advance(info.software_index, 1);
        let byte_count = self.region(key, RegionKind::Meta)?.read_count(next)?;

        self.rings[key.index()].software_index = next;
        self.buffers_held += 1;

        Ok(Some(RxBuffer {
            channel,
            slot: next,
            byte_count,
            len: (byte_count.max(0) as usize).min(info.slot_size as usize),
        }))
    }

    /// Payload of an acquired buffer.
    ///
    /// # Errors
    ///
    /// `Closed` if the handle is not set up, `InvalidChannel` or
    /// `BufferSizeMismatch` if `buf` does not describe a slot of this handle.
    pub fn buffer(&self, buf: &RxBuffer) -> DmaResult<&[u8]> {
        if self.backend.is_none() {
            return Err(DmaError::Closed);
        }
        let key = self.ring_key(buf.channel, Direction::Receive)?;
        let info = self.rings[key.index()];
        let slot = self
            .region(key, RegionKind::Data)?
            .slot(buf.slot, info.slot_size as usize)?;
        slot.get(..buf.len).ok_or(DmaError::BufferSizeMismatch {
            expected: slot.len(),
            actual: buf.len,
        })
    }

    /// Give `count` receive slots of `channel` back to the device, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// `ReleaseUnmet` if the ring does not hold `count` releasable slots, or
    /// `ReleaseFailed` if the driver rejects the command. Both leave the ring
    /// unchanged and are recoverable.
    pub fn release_buffers(&mut self, channel: usize, count: u32) -> DmaResult<()> {
        let start = self.clock.now();
        let result = self
            .ensure_initialized()
            .and_then(|()| self.release_inner(channel, count));
        self.account(start);
        result
    }

    fn release_inner(&mut self, channel: usize, count: u32) -> DmaResult<()> {
        let key = self.ring_key(channel, Direction::Receive)?;
        let info = self.rings[key.index()];

        let available = info.releasable();
        if count > available {
            log::warn!("{key}: cannot release {count} slot(s), {available} releasable");
            return Err(DmaError::ReleaseUnmet {
                channel,
                requested: count,
                available,
            });
        }
        if count == 0 {
            return Ok(());
        }
        if count > MAX_GIVE_COUNT {
            return Err(DmaError::InvalidArgument(format!(
                "release count {count} exceeds {MAX_GIVE_COUNT}"
            )));
        }

        self.device_mut()?
            .give(key, count)
            .map_err(|source| {
                log::warn!("{key}: BUF_GIVE of {count} slot(s) failed: {source}");
                DmaError::ReleaseFailed { channel, source }
            })?;

        let ring = &mut self.rings[key.index()];
        let outstanding = ring.outstanding();
        ring.released_index = ring.advance(ring.released_index, count);
        if count >= outstanding {
            // Unread slots were given back too.
            ring.software_index = ring.released_index;
        }
        self.buffers_held = self.buffers_held.saturating_sub(count);
        Ok(())
    }

    /// Refresh the receive ring of `channel` and release every filled slot.
    ///
    /// Returns the number of slots released.
    pub fn drain_all(&mut self, channel: usize) -> DmaResult<u32> {
        let start = self.clock.now();
        let result = self.ensure_initialized().and_then(|()| {
            let key = self.ring_key(channel, Direction::Receive)?;
            self.refresh(key, 0)?;
            self.release_all(channel)
        });
        self.account(start);
        result
    }

    fn release_all(&mut self, channel: usize) -> DmaResult<u32> {
        let key = self.ring_key(channel, Direction::Receive)?;
        let count = self.rings[key.index()].releasable();
        if count > 0 {
            self.release_inner(channel, count)?;
        }
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Transmit path
    // ------------------------------------------------------------------------

    /// Copy `payload` into the next transmit slot of `channel` and commit it.
    ///
    /// Waits for a free slot for up to the configured budget, polling the
    /// driver. Returns the number of bytes committed.
    ///
    /// # Errors
    ///
    /// - `TransmitStall` (fatal) if no slot frees up within the budget.
    /// - `CommitFailed` (recoverable) if every BUF_XMIT attempt fails; the
    ///   slot is not advanced.
    /// - `BufferSizeMismatch` if `payload` is larger than a slot.
    pub fn send_buffer(&mut self, channel: usize, payload: &[u8]) -> DmaResult<usize> {
        let start = self.clock.now();
        let result = self.send_inner(channel, payload);
        if let Ok(len) = result {
            self.stats.bytes_written += len as u64;
        }
        self.account(start);
        result
    }

    fn send_inner(&mut self, channel: usize, payload: &[u8]) -> DmaResult<usize> {
        let key = self.prepare_send(channel, payload)?;
        if self.rings[key.index()].ready_delta() <= 1 {
            self.wait_for_free_slot(key)?;
        }
        let slot = self.fill_slot(key, payload)?;

        let clock = Arc::clone(&self.clock);
        let (attempts, pause) = (self.config.commit_attempts, self.config.commit_pause);
        let length = payload.len();
        let device = self.device_mut()?;
        let committed = retry(clock.as_ref(), attempts, pause, |attempt| {
            commit_attempt(device, key, length, attempt, attempts)
        });
        self.finish_commit(key, slot, length, committed)
    }

    /// Async [`send_buffer`](Self::send_buffer): waits for a free slot and
    /// between commit attempts on the tokio timer instead of sleeping.
    ///
    /// Driver requests themselves stay synchronous.
    #[cfg(feature = "async")]
    pub async fn send_buffer_async(&mut self, channel: usize, payload: &[u8]) -> DmaResult<usize> {
        let start = self.clock.now();
        let result = self.send_inner_async(channel, payload).await;
        if let Ok(len) = result {
            self.stats.bytes_written += len as u64;
        }
        self.account(start);
        result
    }

    #[cfg(feature = "async")]
    async fn send_inner_async(&mut self, channel: usize, payload: &[u8]) -> DmaResult<usize> {
        let key = self.prepare_send(channel, payload)?;
        if self.rings[key.index()].ready_delta() <= 1 {
            let (budget, interval) = (self.config.transmit_budget, self.config.poll_interval);
            let outcome = crate::poll::poll_until_async(budget, interval, || {
                let ready = self
                    .refresh(key, 0)
                    .map(|info| (info.ready_delta() > 1).then_some(()));
                std::future::ready(ready)
            })
            .await?;
            transmit_outcome(key, outcome)?;
        }
        let slot = self.fill_slot(key, payload)?;

        let (attempts, pause) = (self.config.commit_attempts, self.config.commit_pause);
        let length = payload.len();
        let device = self.device_mut()?;
        let committed = crate::poll::retry_async(attempts, pause, |attempt| {
            commit_attempt(device, key, length, attempt, attempts)
        })
        .await;
        self.finish_commit(key, slot, length, committed)
    }

    /// Lazy init, channel and size checks shared by both send variants.
    fn prepare_send(&mut self, channel: usize, payload: &[u8]) -> DmaResult<RingKey> {
        self.ensure_initialized()?;
        let key = self.ring_key(channel, Direction::Transmit)?;

        let slot_size = self.rings[key.index()].slot_size as usize;
        let limit = slot_size.min(MAX_XMIT_LENGTH);
        if payload.len() > limit {
            return Err(DmaError::BufferSizeMismatch {
                expected: limit,
                actual: payload.len(),
            });
        }
        Ok(key)
    }

    /// Copy `payload` into the slot at the software cursor.
    fn fill_slot(&mut self, key: RingKey, payload: &[u8]) -> DmaResult<u32> {
        let info = self.rings[key.index()];
        let slot = info.software_index;
        self.region_mut(key, RegionKind::Data)?
            .slot_mut(slot, info.slot_size as usize)?[..payload.len()]
            .copy_from_slice(payload);
        Ok(slot)
    }

    fn finish_commit(
        &mut self,
        key: RingKey,
        slot: u32,
        length: usize,
        committed: Result<(), RetryExhausted<io::Error>>,
    ) -> DmaResult<usize> {
        committed.map_err(|exhausted| DmaError::CommitFailed {
            channel: key.channel,
            attempts: exhausted.attempts,
            source: exhausted.error,
        })?;
        let ring = &mut self.rings[key.index()];
        ring.software_index = ring.advance(slot, 1);
        Ok(length)
    }

    fn wait_for_free_slot(&mut self, key: RingKey) -> DmaResult<()> {
        let clock = Arc::clone(&self.clock);
        let (budget, interval) = (self.config.transmit_budget, self.config.poll_interval);

        let outcome = poll_until(clock.as_ref(), budget, interval, || {
            let info = self.refresh(key, 0)?;
            Ok::<_, DmaError>((info.ready_delta() > 1).then_some(()))
        })?;
        transmit_outcome(key, outcome)
    }

    // ------------------------------------------------------------------------
    // Register access
    // ------------------------------------------------------------------------

    /// Read a device register.
    pub fn read_register(&mut self, address: u32, timeout_ms: u32) -> DmaResult<u32> {
        let start = self.clock.now();
        let result = self.register_access(RegAccessArgs::read(address), timeout_ms);
        self.account(start);
        result
    }

    /// Write a device register.
    pub fn write_register(&mut self, address: u32, timeout_ms: u32, value: u32) -> DmaResult<()> {
        let start = self.clock.now();
        let result = self
            .register_access(RegAccessArgs::write(address, value), timeout_ms)
            .map(|_| ());
        self.account(start);
        result
    }

    fn register_access(&mut self, args: RegAccessArgs, timeout_ms: u32) -> DmaResult<u32> {
        self.ensure_initialized()?;
        log::trace!(
            "REG_ACCESS {} {:#06x} (tmo {} ms)",
            if args.is_write() { "write" } else { "read" },
            args.reg_offset,
            timeout_ms
        );
        self.device_mut()?
            .register_access(args)
            .map_err(|source| {
                log::warn!("register access at {:#06x} failed: {}", args.reg_offset, source);
                DmaError::RegisterAccess {
                    offset: args.reg_offset,
                    source,
                }
            })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn account(&mut self, start: Instant) {
        let elapsed = self.clock.now().saturating_duration_since(start);
        self.stats.device_time_ns += elapsed.as_nanos() as u64;
    }

    fn ring_key(&self, channel: usize, direction: Direction) -> DmaResult<RingKey> {
        if channel >= MAX_CHANNELS {
            return Err(DmaError::InvalidChannel(channel));
        }
        Ok(RingKey::new(channel, direction))
    }

    fn device_mut(&mut self) -> DmaResult<&mut dyn DeviceBackend> {
        Ok(self.backend.as_mut().ok_or(DmaError::Closed)?.device_mut())
    }

    fn region(&self, key: RingKey, kind: RegionKind) -> DmaResult<&MappedRegion> {
        self.backend
            .as_ref()
            .ok_or(DmaError::Closed)?
            .device()
            .region(key, kind)
            .ok_or_else(|| DmaError::MmapFailed(format!("{kind} region of {key} not mapped")))
    }

    fn region_mut(&mut self, key: RingKey, kind: RegionKind) -> DmaResult<&mut MappedRegion> {
        self.device_mut()?
            .region_mut(key, kind)
            .ok_or_else(|| DmaError::MmapFailed(format!("{kind} region of {key} not mapped")))
    }

    /// Query the driver and update the cached device-owned fields.
    fn refresh(&mut self, key: RingKey, timeout_ms: u32) -> DmaResult<ChannelInfo> {
        let cached = self.rings[key.index()];
        match self.device_mut()?.query(key, timeout_ms) {
            Ok(Some(state)) => {
                validate_state(key, &state, Some(&cached))?;
                self.rings[key.index()].refresh(state);
            }
            Ok(None) => log::debug!("{key}: query timed out after {timeout_ms} ms"),
            Err(source) => return Err(query_failed(key, source)),
        }
        Ok(self.rings[key.index()])
    }
}

impl std::fmt::Debug for DmaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaEngine")
            .field("backend", &self.backend)
            .field("buffers_held", &self.buffers_held)
            .field("stats", &self.stats)
            .field("closed", &self.closed)
            .finish()
    }
}

fn commit_attempt(
    device: &mut dyn DeviceBackend,
    key: RingKey,
    length: usize,
    attempt: u32,
    attempts: u32,
) -> io::Result<()> {
    device.transmit(key.channel, length).inspect_err(|e| {
        log::warn!("{key}: BUF_XMIT attempt {attempt}/{attempts} failed: {e}")
    })
}

/// Map an expired wait for a free transmit slot to the fatal stall error.
fn transmit_outcome(key: RingKey, outcome: PollOutcome<()>) -> DmaResult<()> {
    match outcome {
        PollOutcome::Ready(()) => Ok(()),
        PollOutcome::Expired { waited } => {
            log::error!(
                "{key}: device not draining, no free slot after {} ms",
                waited.as_millis()
            );
            Err(DmaError::TransmitStall {
                channel: key.channel,
                waited_ms: waited.as_millis() as u64,
            })
        }
    }
}

fn query_failed(key: RingKey, source: io::Error) -> DmaError {
    log::error!("{key}: GET_INFO failed: {source}");
    DmaError::QueryFailed { key, source }
}

/// Reject ring state that would break the index invariants or no longer
/// matches the mapped regions.
fn validate_state(key: RingKey, state: &RingState, cached: Option<&ChannelInfo>) -> DmaResult<()> {
    let problem = if state.slot_count == 0 || state.slot_size == 0 {
        Some(format!(
            "empty ring geometry ({} x {})",
            state.slot_count, state.slot_size
        ))
    } else if state.hardware_index >= state.slot_count || state.software_index >= state.slot_count {
        Some(format!(
            "index out of range (hw {}, sw {}, slots {})",
            state.hardware_index, state.software_index, state.slot_count
        ))
    } else {
        cached
            .filter(|c| c.slot_count != state.slot_count || c.slot_size != state.slot_size)
            .map(|c| {
                format!(
                    "geometry changed from {} x {} to {} x {}",
                    c.slot_count, c.slot_size, state.slot_count, state.slot_size
                )
            })
    };
    match problem {
        Some(msg) => Err(query_failed(
            key,
            io::Error::new(io::ErrorKind::InvalidData, msg),
        )),
        None => Ok(()),
    }
}

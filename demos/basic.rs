// CFO/DTC DMA Ring-Buffer Engine
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example driving the DMA engine.
//!
//! Run with: `CFOLIB_SIM_ENABLE=1 cargo run --example basic`
//!
//! Without `CFOLIB_SIM_ENABLE` the example talks to the card at
//! `CFOLIB_DEVICE` (default `/dev/cfo0`).

use cfo_dma::{is_device_available, DmaEngine, DmaError, EngineConfig, RingKey, MAX_CHANNELS};
use std::process;

/// Fatal errors end the program; everything else is reported and skipped.
fn check<T>(what: &str, result: Result<T, DmaError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_fatal() => {
            eprintln!("  {what} failed fatally: {e}");
            process::exit(1);
        }
        Err(e) => {
            println!("  {what} failed: {e}");
            None
        }
    }
}

fn main() {
    println!("CFO/DTC DMA Basic Example");
    println!("=========================\n");

    let config = EngineConfig::from_env();
    println!("Configuration:");
    println!("  Mode: {:?}", config.mode);
    println!(
        "  Device: {} (present: {})",
        config.device_path.display(),
        is_device_available(&config.device_path)
    );
    println!();

    println!("Opening engine...");
    let mut engine = DmaEngine::new(config);
    if let Some(mode) = check("init", engine.init()) {
        println!("  Initialized in {:?} mode", mode);
    }
    println!();

    println!("Ring state:");
    for (key, info) in engine.ring_snapshot() {
        println!("  {key}: {info}");
    }
    println!();

    // Transmit on both channels; the simulator loops payloads back.
    println!("Sending one buffer per channel...");
    for channel in 0..MAX_CHANNELS {
        let payload = format!("hello from channel {channel}");
        if let Some(len) = check("send", engine.send_buffer(channel, payload.as_bytes())) {
            println!("  ch{channel}: committed {len} bytes");
        }
    }
    println!();

    println!("Receiving...");
    for channel in 0..MAX_CHANNELS {
        match check("acquire", engine.acquire_buffer(channel, 100)) {
            Some(Some(buf)) => {
                if let Some(data) = check("read", engine.buffer(&buf)) {
                    println!(
                        "  ch{channel}: slot {} holds {:?}",
                        buf.slot,
                        String::from_utf8_lossy(data)
                    );
                }
                check("release", engine.release_buffers(channel, 1));
            }
            Some(None) => println!("  ch{channel}: nothing received"),
            None => {}
        }
    }
    println!();

    println!("Register access...");
    if check("write", engine.write_register(0x9004, 100, 0x1234_5678)).is_some() {
        if let Some(value) = check("read", engine.read_register(0x9004, 100)) {
            println!("  0x9004 = {value:#010x}");
        }
    }
    println!();

    let stats = engine.stats();
    println!("Statistics:");
    println!("  Bytes written: {}", stats.bytes_written);
    println!("  Bytes read: {}", stats.bytes_read);
    println!("  Device time: {} ns", stats.device_time_ns);
    println!(
        "  Receive delta ch0: {}",
        engine.ready_delta(RingKey::receive(0))
    );
    println!();

    engine.close();
    println!("Done!");
}

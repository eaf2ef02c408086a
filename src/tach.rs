// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Tachometer edge capture and RPM estimation.
//!
//! Each fan channel owns one [`EdgeCell`]. The edge handler is the only
//! writer and runs in interrupt context, so it must never wait on the reader.
//! The cell uses a sequence counter: the writer bumps it to an odd value,
//! stores both timestamps, then bumps it to even. A reader that sees an odd
//! value, or a value that changed while it was copying, simply retries. The
//! writer never spins.
//!
//! RPM is derived from the two most recent edges only. That gives a noisy
//! estimate but detects a stalled fan within one staleness window.

use crate::clock::Clock;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

/// Edges closer together than this are treated as noise. Zero accepts all.
pub const DEFAULT_DEBOUNCE_MS: u64 = 0;

/// No edge for this long means the fan is stopped or disconnected.
pub const DEFAULT_STUCK_THRESHOLD_MS: u64 = 500;

/// Tachometer pulses per mechanical revolution, fixed by the fan hardware.
pub const DEFAULT_PULSES_PER_REVOLUTION: u32 = 2;

/// Tachometer timing parameters shared by every fan channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TachSettings {
    pub debounce_ms: u64,
    pub stuck_threshold_ms: u64,
    pub pulses_per_revolution: u32,
}

impl Default for TachSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            stuck_threshold_ms: DEFAULT_STUCK_THRESHOLD_MS,
            pulses_per_revolution: DEFAULT_PULSES_PER_REVOLUTION,
        }
    }
}

/// A coherent copy of a channel's two most recent edge timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeSnapshot {
    pub previous_ms: u64,
    pub latest_ms: u64,
}

/// Single-producer edge timestamp pair with a torn-read-free snapshot.
#[derive(Debug, Default)]
pub struct EdgeCell {
    seq: AtomicU32,
    previous_ms: AtomicU64,
    latest_ms: AtomicU64,
}

impl EdgeCell {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            previous_ms: AtomicU64::new(0),
            latest_ms: AtomicU64::new(0),
        }
    }

    /// Record an edge seen at `now_ms`. Returns false if it fell inside the
    /// debounce window and was dropped.
    ///
    /// Must only be called from the channel's single edge handler.
    pub fn record(&self, now_ms: u64, debounce_ms: u64) -> bool {
        // Sole writer: our own last store is always visible to us.
        let latest = self.latest_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(latest) <= debounce_ms {
            return false;
        }

        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.previous_ms.store(latest, Ordering::Relaxed);
        self.latest_ms.store(now_ms, Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
        true
    }

    /// Copy both timestamps as they were after one complete `record` call.
    pub fn snapshot(&self) -> EdgeSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }
            let previous_ms = self.previous_ms.load(Ordering::Relaxed);
            let latest_ms = self.latest_ms.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return EdgeSnapshot {
                    previous_ms,
                    latest_ms,
                };
            }
            hint::spin_loop();
        }
    }
}

/// Per-channel edge handler, handed to whatever binds tachometer interrupts.
///
/// `on_edge` is O(1), allocation free and lock free.
pub struct TachHandler<C: Clock> {
    cell: Arc<EdgeCell>,
    clock: Arc<C>,
    debounce_ms: u64,
}

impl<C: Clock> TachHandler<C> {
    pub fn new(cell: Arc<EdgeCell>, clock: Arc<C>, debounce_ms: u64) -> Self {
        Self {
            cell,
            clock,
            debounce_ms,
        }
    }

    /// Call on each rising edge of the tachometer line.
    pub fn on_edge(&self) {
        self.cell.record(self.clock.now_ms(), self.debounce_ms);
    }
}

impl<C: Clock> Clone for TachHandler<C> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            clock: Arc::clone(&self.clock),
            debounce_ms: self.debounce_ms,
        }
    }
}

/// Convert an edge pair into RPM.
///
/// `now_ms` must be read before the snapshot is taken, so an edge landing in
/// between can only make the pair look fresher, never staler.
///
/// Returns 0 when the latest edge is older than the stuck threshold, or when
/// fewer than two edges have been recorded.
pub fn estimate_rpm(edges: EdgeSnapshot, now_ms: u64, settings: &TachSettings) -> u32 {
    if now_ms.saturating_sub(edges.latest_ms) >= settings.stuck_threshold_ms {
        return 0;
    }
    // A zero previous timestamp is the unwritten initial value.
    if edges.previous_ms == 0 || edges.latest_ms <= edges.previous_ms {
        return 0;
    }

    let delta_ms = (edges.latest_ms - edges.previous_ms) as f64;
    let pulses = f64::from(settings.pulses_per_revolution.max(1));
    let rpm = (60_000.0 / delta_ms) / pulses;
    if rpm.is_finite() && rpm > 0.0 {
        rpm as u32
    } else {
        0
    }
}

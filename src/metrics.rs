//! Lightweight metrics helpers for Warren.
//!
//! This module exposes a small set of convenience functions and an RAII timer
//! wrapping the `metrics` crate macros. It intentionally avoids embedding a
//! concrete exporter (the application can initialize any compatible recorder
//! externally) while still documenting and describing Warren-specific metric
//! names.
//!
//! Provided metrics (labels vary by family):
//! * `warren_dispatches_total` (counter; labels: hostname, mode, status)
//! * `warren_dispatch_duration_seconds` (histogram; labels: hostname, mode)
//! * `warren_peers_connected` (gauge)
//! * `warren_frames_dropped_total` (counter; labels: reason)
//! * `warren_captures_recorded_total` (counter)
//! * `warren_captures_dropped_total` (counter)
//! * `warren_replays_total` (counter; labels: outcome)
//!
//! The timer leverages `Drop` so durations are recorded even on early
//! returns.
use std::time::Instant;

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

use crate::core::frame::ResponseMode;

pub const WARREN_DISPATCHES_TOTAL: &str = "warren_dispatches_total";
pub const WARREN_DISPATCH_DURATION_SECONDS: &str = "warren_dispatch_duration_seconds";
pub const WARREN_PEERS_CONNECTED: &str = "warren_peers_connected";
pub const WARREN_FRAMES_DROPPED_TOTAL: &str = "warren_frames_dropped_total";
pub const WARREN_CAPTURES_RECORDED_TOTAL: &str = "warren_captures_recorded_total";
pub const WARREN_CAPTURES_DROPPED_TOTAL: &str = "warren_captures_dropped_total";
pub const WARREN_REPLAYS_TOTAL: &str = "warren_replays_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        WARREN_DISPATCHES_TOTAL,
        Unit::Count,
        "Total dispatches handled by the gateway."
    );
    describe_histogram!(
        WARREN_DISPATCH_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of dispatches from issue to terminal state."
    );
    describe_gauge!(
        WARREN_PEERS_CONNECTED,
        "Number of peers currently bound in the registry."
    );
    describe_counter!(
        WARREN_FRAMES_DROPPED_TOTAL,
        Unit::Count,
        "Inbound control frames dropped (malformed, unknown type)."
    );
    describe_counter!(
        WARREN_CAPTURES_RECORDED_TOTAL,
        Unit::Count,
        "Request logs persisted by the recorder."
    );
    describe_counter!(
        WARREN_CAPTURES_DROPPED_TOTAL,
        Unit::Count,
        "Request logs dropped because the capture queue was full."
    );
    describe_counter!(
        WARREN_REPLAYS_TOTAL,
        Unit::Count,
        "Replay attempts (by outcome)."
    );
});

fn mode_label(mode: ResponseMode) -> &'static str {
    match mode {
        ResponseMode::Buffer => "buffer",
        ResponseMode::Stream => "stream",
    }
}

/// Update the bound-peer gauge after a registry mutation.
pub fn set_peers_connected(count: usize) {
    Lazy::force(&DESCRIBED);
    gauge!(WARREN_PEERS_CONNECTED).set(count as f64);
}

/// Count one dropped inbound frame.
pub fn increment_frames_dropped(reason: &'static str) {
    Lazy::force(&DESCRIBED);
    counter!(WARREN_FRAMES_DROPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn increment_captures_recorded() {
    Lazy::force(&DESCRIBED);
    counter!(WARREN_CAPTURES_RECORDED_TOTAL).increment(1);
}

pub fn increment_captures_dropped() {
    Lazy::force(&DESCRIBED);
    counter!(WARREN_CAPTURES_DROPPED_TOTAL).increment(1);
}

/// Count one replay attempt.
pub fn increment_replays(outcome: &'static str) {
    Lazy::force(&DESCRIBED);
    counter!(WARREN_REPLAYS_TOTAL, "outcome" => outcome).increment(1);
}

/// RAII timer for one dispatch: records the counter and the latency histogram
/// when finished (or dropped on an early return).
pub struct DispatchTimer {
    hostname: String,
    mode: ResponseMode,
    started_at: Instant,
    finished: bool,
}

impl DispatchTimer {
    pub fn start(hostname: &str, mode: ResponseMode) -> Self {
        Lazy::force(&DESCRIBED);
        Self {
            hostname: hostname.to_string(),
            mode,
            started_at: Instant::now(),
            finished: false,
        }
    }

    /// Record the terminal status and stop the timer.
    pub fn finish(mut self, status: u16) {
        self.finished = true;
        counter!(
            WARREN_DISPATCHES_TOTAL,
            "hostname" => self.hostname.clone(),
            "mode" => mode_label(self.mode),
            "status" => status.to_string(),
        )
        .increment(1);
        self.record_duration();
    }

    fn record_duration(&self) {
        histogram!(
            WARREN_DISPATCH_DURATION_SECONDS,
            "hostname" => self.hostname.clone(),
            "mode" => mode_label(self.mode),
        )
        .record(self.started_at.elapsed().as_secs_f64());
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.record_duration();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_finish_consumes_without_panic() {
        let timer = DispatchTimer::start("a.example", ResponseMode::Buffer);
        timer.finish(200);
    }

    #[test]
    fn helpers_are_callable_without_a_recorder() {
        set_peers_connected(3);
        increment_frames_dropped("malformed");
        increment_captures_recorded();
        increment_captures_dropped();
        increment_replays("ok");
    }
}

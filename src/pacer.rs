//! Emission timing: one deadline-based wait shared by live and recorded runs.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::midi::event::MidiEvent;
use crate::midi::sink::MidiSink;

/// Monotonic time since the run started.
pub trait Clock {
    fn now(&self) -> Duration;

    /// Block until `deadline`; returns at once if it has passed.
    fn sleep_until(&self, deadline: Duration);
}

pub type SharedClock = Rc<dyn Clock>;

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Clock that jumps straight to every deadline. Renders recordings without
/// real-time waits while keeping event timing consistent.
#[derive(Clone, Default)]
pub struct VirtualClock {
    now: Rc<Cell<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward, as processing work would.
    #[cfg(test)]
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Duration) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

/// At most one message per key per interval.
pub struct RateLimiter {
    interval: Duration,
    last: HashMap<u8, Duration>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    pub fn allow(&mut self, key: u8, now: Duration) -> bool {
        match self.last.get(&key) {
            Some(&prev) if now.saturating_sub(prev) < self.interval => false,
            _ => {
                self.last.insert(key, now);
                true
            }
        }
    }
}

pub struct Pacer {
    clock: SharedClock,
    /// Ordered by due time; equal times keep scheduling order.
    pending: Vec<(Duration, MidiEvent)>,
    limiter: RateLimiter,
}

impl Pacer {
    pub fn new(clock: SharedClock, send_interval: Duration) -> Self {
        Self {
            clock,
            pending: Vec::new(),
            limiter: RateLimiter::new(send_interval),
        }
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn schedule(&mut self, at: Duration, event: MidiEvent) {
        let pos = self.pending.partition_point(|(t, _)| *t <= at);
        self.pending.insert(pos, (at, event));
    }

    /// Whether a control change for `controller` may go out now.
    pub fn allow(&mut self, controller: u8) -> bool {
        let now = self.clock.now();
        self.limiter.allow(controller, now)
    }

    /// Send each event due by `deadline` at its time, then wait for `deadline`.
    pub fn run_until(&mut self, deadline: Duration, sink: &mut dyn MidiSink) -> Result<()> {
        while let Some(&(at, event)) = self.pending.first() {
            if at > deadline {
                break;
            }
            self.clock.sleep_until(at);
            self.pending.remove(0);
            sink.send(&event)?;
        }
        self.clock.sleep_until(deadline);
        Ok(())
    }

    /// Send whatever is already due without waiting.
    pub fn flush_due(&mut self, sink: &mut dyn MidiSink) -> Result<()> {
        let now = self.clock.now();
        let due = self.pending.partition_point(|(t, _)| *t <= now);
        for (_, event) in self.pending.drain(..due) {
            sink.send(&event)?;
        }
        Ok(())
    }

    /// Send everything still scheduled, immediately.
    pub fn drain(&mut self, sink: &mut dyn MidiSink) -> Result<()> {
        for (_, event) in self.pending.drain(..) {
            sink.send(&event)?;
        }
        Ok(())
    }
}

/// Longest wait any setting can ask for: one day.
pub const MAX_WAIT: Duration = Duration::from_secs(86_400);

/// Seconds to a `Duration`, clamped to `0..=MAX_WAIT`; NaN reads as zero.
pub fn secs(s: f64) -> Duration {
    if !(s > 0.0) {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(s.min(MAX_WAIT.as_secs_f64()))
}

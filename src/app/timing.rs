use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source, in seconds since the clock was created.
pub trait Clock {
    fn now(&self) -> f32;
}

#[derive(Debug, Clone)]
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
    fn now(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// Hand-advanced clock. Clones share the same time, so a test (or a fixed-rate
/// driver) can keep one copy and hand the other to the viewer.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_secs(&self, seconds: f32) {
        self.advance(Duration::from_secs_f32(seconds.max(0.0)));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f32 {
        self.now.get().as_secs_f32()
    }
}

/// Play time bookkeeping: wall time spent paused never reaches `elapsed`.
#[derive(Debug)]
pub struct AnimationClock<C: Clock> {
    clock: C,
    playing: bool,
    paused_at: f32,
    time_offset: f32,
}

impl<C: Clock> AnimationClock<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            playing: true,
            paused_at: 0.0,
            time_offset: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Seconds of play time since the last reset.
    pub fn elapsed(&self) -> f32 {
        let now = if self.playing {
            self.clock.now()
        } else {
            self.paused_at
        };
        now - self.time_offset
    }

    /// Returns whether the state changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        match (self.playing, playing) {
            (true, false) => {
                self.paused_at = self.clock.now();
                self.playing = false;
                true
            }
            (false, true) => {
                self.time_offset += self.clock.now() - self.paused_at;
                self.playing = true;
                true
            }
            _ => false,
        }
    }

    /// Restarts play time at zero from the current instant.
    pub fn reset(&mut self) {
        let now = self.clock.now();
        self.paused_at = now;
        self.time_offset = now;
    }

    pub fn wall_time(&self) -> f32 {
        self.clock.now()
    }
}

/// Frame cadence measurement for the frame loop.
#[derive(Debug)]
pub struct FrameTiming {
    last_frame_time: Option<f32>,
    last_report_time: f32,
    frame_count: u32,
    pub frame_dt: f32,
}

impl FrameTiming {
    pub fn new() -> Self {
        Self {
            last_frame_time: None,
            last_report_time: 0.0,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
        }
    }

    pub fn update(&mut self, now: f32) {
        if let Some(last) = self.last_frame_time {
            self.frame_dt = (now - last).max(0.0);
        }
        self.last_frame_time = Some(now);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now - self.last_report_time;
        if elapsed >= 5.0 {
            log::debug!(
                "{:.1} fps (cadence {:.2} ms)",
                self.frame_count as f32 / elapsed,
                self.frame_dt * 1000.0
            );
            self.frame_count = 0;
            self.last_report_time = now;
        }
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}

use std::time::Instant;

/// Clock reading for one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub seconds: f32,
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Where the scene clock comes from: wall time for the preview, frame-locked
/// time for sequence exports.
pub trait TimeSource: Send {
    fn reset(&mut self);
    /// Reading for the next frame; advances the frame counter.
    fn sample(&mut self) -> TimeSample;
}

/// Seconds since the session started.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    started: Instant,
    frames: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        *self = Self::new();
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.started.elapsed().as_secs_f32(), self.frames);
        self.frames = self.frames.saturating_add(1);
        sample
    }
}

/// Frame-locked clock: frame `n` is evaluated at `base + n / frame_rate`
/// regardless of how long each frame took to produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualTimeSource {
    base: f32,
    frame_rate: f32,
    next_frame: u64,
}

impl VirtualTimeSource {
    pub fn new(base: f32, frame_rate: u32) -> Self {
        Self {
            base,
            frame_rate: frame_rate.max(1) as f32,
            next_frame: 0,
        }
    }

    /// Time of an arbitrary frame; the counter used by `sample` is untouched.
    pub fn at(&self, frame_index: u64) -> TimeSample {
        let seconds = self.base + (frame_index as f64 / f64::from(self.frame_rate)) as f32;
        TimeSample::new(seconds, frame_index)
    }
}

impl TimeSource for VirtualTimeSource {
    fn reset(&mut self) {
        self.next_frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = self.at(self.next_frame);
        self.next_frame = self.next_frame.saturating_add(1);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_steps_by_frame_period() {
        let mut clock = VirtualTimeSource::new(10.0, 60);
        let first = clock.sample();
        let second = clock.sample();
        assert_eq!(first, TimeSample::new(10.0, 0));
        assert_eq!(second.frame_index, 1);
        assert!((second.seconds - (10.0 + 1.0 / 60.0)).abs() < 1e-5);
        assert!((clock.at(300).seconds - 15.0).abs() < 1e-4);
        clock.reset();
        assert_eq!(clock.sample().frame_index, 0);
    }

    #[test]
    fn virtual_clock_with_zero_rate_does_not_divide_by_zero() {
        let clock = VirtualTimeSource::new(2.0, 0);
        assert_eq!(clock.at(3).seconds, 5.0);
    }

    #[test]
    fn system_clock_counts_frames() {
        let mut clock = SystemTimeSource::new();
        let a = clock.sample();
        let b = clock.sample();
        assert_eq!(a.frame_index + 1, b.frame_index);
        assert!(b.seconds >= a.seconds);
        clock.reset();
        assert_eq!(clock.sample().frame_index, 0);
    }
}

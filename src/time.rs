use std::time::{Duration, Instant};

/// Frame clock sampled once per redraw.
pub struct Time {
    start: Instant,
    last: Instant,
    delta: Duration,
    frame: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, frame: 0 }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
        self.frame = self.frame.wrapping_add(1);
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_frame_and_elapsed() {
        let mut time = Time::new();
        assert_eq!(time.frame(), 0);
        assert_eq!(time.elapsed_seconds(), 0.0);
        std::thread::sleep(Duration::from_millis(2));
        time.tick();
        assert_eq!(time.frame(), 1);
        assert!(time.delta_seconds() > 0.0);
        assert!((time.elapsed_seconds() - time.delta_seconds()).abs() < 1e-6);
    }
}

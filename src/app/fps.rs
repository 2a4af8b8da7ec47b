use std::time::{Duration, Instant};

/// Counts presented frames and reports the rate once per interval
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
        }
    }

    /// Records one frame. Returns the rounded frame rate when a full
    /// interval has elapsed, then starts counting the next one.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let fps = (self.frames as f64 / elapsed.as_secs_f64()).round() as u32;
        self.window_start = now;
        self.frames = 0;
        Some(fps)
    }
}

pub fn title_with_fps(title: &str, fps: u32) -> String {
    format!("{}\tFPS = {}", title, fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn silent_until_interval_elapses() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(SECOND, start);
        for i in 1..60 {
            assert_eq!(fps.tick(start + SECOND * i / 60), None);
        }
        assert_eq!(fps.tick(start + SECOND), Some(60));
    }

    #[test]
    fn counter_restarts_after_reporting() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(SECOND, start);
        assert_eq!(fps.tick(start + SECOND), Some(1));

        let next = start + SECOND;
        for i in 1..30 {
            assert_eq!(fps.tick(next + SECOND * i / 30), None);
        }
        assert_eq!(fps.tick(next + SECOND), Some(30));
    }

    #[test]
    fn title_is_tab_separated() {
        assert_eq!(title_with_fps("Cadence", 144), "Cadence\tFPS = 144");
    }
}

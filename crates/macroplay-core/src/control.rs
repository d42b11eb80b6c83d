//! Host-side controls shared with a running script: cancellation and
//! playback speed.
//!
//! A [`RunControl`] is cheap to clone; every clone observes the same token
//! and speed. Sleeps are split into [`SLEEP_CHUNK`] pieces so that a stop
//! request or speed change takes effect within one chunk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Longest single blocking sleep.
pub const SLEEP_CHUNK: Duration = Duration::from_millis(50);

/// Lowest accepted playback speed.
pub const MIN_SPEED: f64 = 0.01;

/// Returned by a sleep that was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug, Clone)]
pub struct RunControl {
    token: CancellationToken,
    speed: Arc<AtomicU64>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.max(MIN_SPEED)
    } else {
        1.0
    }
}

impl RunControl {
    pub fn new(speed: f64) -> Self {
        Self {
            token: CancellationToken::new(),
            speed: Arc::new(AtomicU64::new(clamp_speed(speed).to_bits())),
        }
    }

    /// Requests cooperative cancellation of the run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Relaxed))
    }

    /// Sets the playback speed, clamped to at least [`MIN_SPEED`].
    pub fn set_speed(&self, speed: f64) {
        self.speed
            .store(clamp_speed(speed).to_bits(), Ordering::Relaxed);
    }

    /// Blocks for `ms` script milliseconds, scaled by the current speed.
    ///
    /// The speed is re-read before every chunk, so a change mid-sleep
    /// applies to the remaining time.
    pub fn sleep_ms(&self, ms: f64) -> Result<(), Cancelled> {
        let mut remaining = ms.max(0.0);
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            if remaining <= 0.0 {
                return Ok(());
            }
            let speed = self.speed();
            // Clamp in seconds first: a huge WAIT would overflow Duration.
            let secs = (remaining / speed / 1000.0).min(SLEEP_CHUNK.as_secs_f64());
            let wall = Duration::from_secs_f64(secs);
            if wall.is_zero() {
                return Ok(());
            }
            std::thread::sleep(wall);
            remaining -= wall.as_secs_f64() * 1000.0 * speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn speed_is_clamped() {
        let control = RunControl::new(0.0);
        assert_eq!(control.speed(), MIN_SPEED);
        control.set_speed(f64::NAN);
        assert_eq!(control.speed(), 1.0);
        control.set_speed(4.0);
        assert_eq!(control.clone().speed(), 4.0);
    }

    #[test]
    fn huge_sleep_is_cancellable() {
        let control = RunControl::new(1.0);
        let canceller = control.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        let start = Instant::now();
        assert_eq!(control.sleep_ms(1e30), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_millis(500));
        handle.join().unwrap();
    }

    #[test]
    fn sleep_scales_with_speed() {
        let control = RunControl::new(10.0);
        let start = Instant::now();
        control.sleep_ms(500.0).unwrap();
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn cancelled_sleep_returns_within_a_chunk() {
        let control = RunControl::new(1.0);
        let remote = control.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        let start = Instant::now();
        assert_eq!(control.sleep_ms(10_000.0), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_millis(100) + SLEEP_CHUNK * 4);
        stopper.join().unwrap();
    }

    #[test]
    fn zero_sleep_still_observes_cancellation() {
        let control = RunControl::default();
        assert_eq!(control.sleep_ms(0.0), Ok(()));
        control.cancel();
        assert_eq!(control.sleep_ms(0.0), Err(Cancelled));
    }
}

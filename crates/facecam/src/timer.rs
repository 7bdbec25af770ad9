//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt::{self, Arguments},
    sync::Mutex,
    time::{Duration, Instant},
};

/// A timer that can measure how long an operation takes.
///
/// Collected timings are summarized and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]). Timers can be shared between threads.
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    total: Duration,
    max: Duration,
    count: u32,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.total += duration;
        state.max = state.max.max(duration);
        state.count += 1;
    }
}

/// Displays the average and maximum recorded time and resets them.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let State { total, max, count } = std::mem::take(&mut *self.state.lock().unwrap());
        let avg_ms = match count {
            0 => 0.0,
            n => total.as_secs_f64() * 1000.0 / f64::from(n),
        };
        let max_ms = max.as_secs_f64() * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms (max {max_ms:.01}ms)", self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Measures the rate at which results are delivered.
///
/// The counter collects frames in windows of at least one second. Every tick reports the rate
/// observed so far in the current window; the window is logged and restarted once it spans a
/// full second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new<N: Into<String>>(name: N) -> Self {
        Self::starting_at(name, Instant::now())
    }

    /// Creates a counter whose first window opens at `start`.
    pub fn starting_at<N: Into<String>>(name: N, start: Instant) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start,
        }
    }

    /// Returns the number of frames counted in the current window.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Advances the frame counter by 1, returning the current frame rate.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now(), format_args!(""))
    }

    /// Advances the frame counter by 1, returning the current frame rate, and logs it together
    /// with `extra` data if the window is complete.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) -> f64 {
        self.tick_with_at(Instant::now(), extra)
    }

    /// Like [`FpsCounter::tick_with`], but with the frame counted at `now`.
    pub fn tick_with_at<D: fmt::Display, I: IntoIterator<Item = D>>(
        &mut self,
        now: Instant,
        extra: I,
    ) -> f64 {
        struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

        impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let Some(mut iter) = self.0.take() else {
                    return Ok(());
                };
                if let Some(item) = iter.next() {
                    write!(f, " ({item}")?;
                    for item in iter {
                        write!(f, ", {item}")?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
        }

        self.tick_at(
            now,
            format_args!("{}", DisplayExtra(Cell::new(Some(extra.into_iter())))),
        )
    }

    fn tick_at(&mut self, now: Instant, args: Arguments<'_>) -> f64 {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.start);
        let fps = if elapsed.is_zero() {
            0.0
        } else {
            f64::from(self.frames) / elapsed.as_secs_f64()
        };

        if elapsed >= Self::WINDOW {
            log::debug!("{}: {:.1} FPS{}", self.name, fps, args);

            self.frames = 0;
            self.start = now;
        }
        fps
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn thirty_results_in_one_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::starting_at("test", start);

        let mut last = 0.0;
        for i in 1..=30u32 {
            let now = start + Duration::from_secs(1) * i / 30;
            last = fps.tick_with_at(now, [""; 0]);
            if i < 30 {
                assert_eq!(fps.frames(), i);
            }
        }

        assert_relative_eq!(last, 30.0, max_relative = 0.01);
        assert_eq!(fps.frames(), 0);
    }

    #[test]
    fn window_restarts_after_closing() {
        let start = Instant::now();
        let mut fps = FpsCounter::starting_at("test", start);

        fps.tick_with_at(start + Duration::from_millis(1500), [""; 0]);
        assert_eq!(fps.frames(), 0);

        let rate = fps.tick_with_at(start + Duration::from_millis(1750), [""; 0]);
        assert_eq!(fps.frames(), 1);
        assert_relative_eq!(rate, 4.0, max_relative = 1e-6);
    }

    #[test]
    fn first_tick_at_window_start() {
        let start = Instant::now();
        let mut fps = FpsCounter::starting_at("test", start);
        assert_eq!(fps.tick_with_at(start, [""; 0]), 0.0);
        assert_eq!(fps.frames(), 1);
    }

    #[test]
    fn tick_with_extra_closes_overdue_window() {
        let Some(start) = Instant::now().checked_sub(Duration::from_secs(2)) else {
            return;
        };
        let mut fps = FpsCounter::starting_at("test", start);
        let rate = fps.tick_with(["detect: 1x2.0ms", "track: 3x1.0ms"]);
        assert!(rate > 0.0 && rate <= 0.5, "{rate}");
        assert_eq!(fps.frames(), 0);

        fps.tick_with([1, 2]);
        assert_eq!(fps.frames(), 1);
    }

    #[test]
    fn timer_summary_resets() {
        let timer = Timer::new("work");
        timer.record(Duration::from_millis(2));
        timer.record(Duration::from_millis(4));
        assert_eq!(timer.to_string(), "work: 2x3.0ms (max 4.0ms)");
        assert_eq!(timer.to_string(), "work: 0x0.0ms (max 0.0ms)");

        timer.time(|| {});
        assert!(timer.to_string().starts_with("work: 1x"));
    }
}

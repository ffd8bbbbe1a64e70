//! Progress tracking for a single transfer.
//!
//! Every state-changing method has an `*_at` form taking the current
//! [`Instant`], so callers and tests control the clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Number of throughput samples averaged for [`TransferStats::bytes_per_second`].
const WINDOW: usize = 5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Transfer not started. Call start() before update_bytes()")]
    NotStarted,

    #[error("Transfer already finished")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Paused,
    Finished,
}

/// Byte progress and throughput of one transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    state: State,
    bytes_total: Option<u64>,
    bytes_completed: u64,
    /// Byte count at the last throughput sample.
    sampled_bytes: u64,
    samples: VecDeque<f64>,
    started_at: Option<Instant>,
    updated_at: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    finished_at: Option<Instant>,
}

/// Snapshot of a [`Transfer`], derived entirely from its state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub started: bool,
    pub paused: bool,
    pub finished: bool,
    pub bytes_total: Option<u64>,
    pub bytes_completed: u64,
    pub bytes_remaining: Option<u64>,
    /// Fraction done in `0.0..=1.0`; `None` when the total is unknown.
    pub percentage: Option<f64>,
    /// Running time, excluding pauses.
    pub elapsed: Duration,
    /// Mean of the recent throughput samples.
    pub bytes_per_second: f64,
    /// Throughput of the latest update alone.
    pub bytes_per_second_sharp: f64,
    /// Projected duration of the whole transfer at the current rate.
    pub total: Option<Duration>,
    pub remaining: Option<Duration>,
}

impl Transfer {
    pub fn new(bytes_total: Option<u64>) -> Self {
        Self {
            state: State::Idle,
            bytes_total,
            bytes_completed: 0,
            sampled_bytes: 0,
            samples: VecDeque::with_capacity(WINDOW),
            started_at: None,
            updated_at: None,
            paused_at: None,
            paused_total: Duration::ZERO,
            finished_at: None,
        }
    }

    pub fn bytes_completed(&self) -> u64 {
        self.bytes_completed
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Begin the transfer. Only an idle transfer can be started.
    pub fn start_at(&mut self, now: Instant) {
        if self.state == State::Idle {
            self.state = State::Running;
            self.started_at = Some(now);
            self.updated_at = Some(now);
        }
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    /// Pause a running transfer and drop the throughput window.
    pub fn pause_at(&mut self, now: Instant) {
        if self.state == State::Running {
            self.state = State::Paused;
            self.paused_at = Some(now);
            self.samples.clear();
        }
    }

    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    pub fn resume_at(&mut self, now: Instant) {
        if self.state == State::Paused {
            self.end_pause(now);
            self.state = State::Running;
            self.updated_at = Some(now);
            self.sampled_bytes = self.bytes_completed;
        }
    }

    pub fn finish(&mut self) {
        self.finish_at(Instant::now());
    }

    pub fn finish_at(&mut self, now: Instant) {
        match self.state {
            State::Running => {}
            State::Paused => self.end_pause(now),
            State::Idle | State::Finished => return,
        }
        self.state = State::Finished;
        self.finished_at = Some(now);
    }

    fn end_pause(&mut self, now: Instant) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(at);
        }
    }

    pub fn update_bytes(&mut self, bytes_completed: u64) -> Result<(), TelemetryError> {
        self.update_bytes_at(bytes_completed, Instant::now())
    }

    /// Record the running byte count.
    ///
    /// While paused the count is stored but no throughput sample is taken.
    /// Updates arriving at the same instant as the previous one are folded
    /// into the next sample.
    pub fn update_bytes_at(
        &mut self,
        bytes_completed: u64,
        now: Instant,
    ) -> Result<(), TelemetryError> {
        match self.state {
            State::Idle => return Err(TelemetryError::NotStarted),
            State::Finished => return Err(TelemetryError::Finished),
            State::Paused => {}
            State::Running => {
                let last = self.updated_at.unwrap_or(now);
                let dt = now.saturating_duration_since(last);
                if !dt.is_zero() {
                    let delta = bytes_completed.saturating_sub(self.sampled_bytes);
                    if self.samples.len() == WINDOW {
                        self.samples.pop_front();
                    }
                    self.samples.push_back(delta as f64 / dt.as_secs_f64());
                    self.updated_at = Some(now);
                    self.sampled_bytes = bytes_completed;
                }
            }
        }
        self.bytes_completed = bytes_completed;
        Ok(())
    }

    pub fn stats(&self) -> TransferStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> TransferStats {
        let bytes_remaining = self
            .bytes_total
            .map(|total| total.saturating_sub(self.bytes_completed));
        let percentage = match (self.bytes_total, bytes_remaining) {
            (Some(0), _) => Some(1.0),
            (Some(total), Some(remaining)) => Some(1.0 - remaining as f64 / total as f64),
            _ => None,
        };

        let elapsed = self.elapsed_at(now);
        let bytes_per_second = self.mean_rate();
        let total = match self.bytes_total {
            Some(total) if bytes_per_second > 0.0 => {
                Some(Duration::from_secs_f64(total as f64 / bytes_per_second))
            }
            _ => None,
        };
        let remaining = match (bytes_remaining, total) {
            (Some(0), _) => Some(Duration::ZERO),
            (_, Some(total)) => Some(total.saturating_sub(elapsed)),
            _ => None,
        };

        TransferStats {
            started: self.state != State::Idle,
            paused: self.state == State::Paused,
            finished: self.state == State::Finished,
            bytes_total: self.bytes_total,
            bytes_completed: self.bytes_completed,
            bytes_remaining,
            percentage,
            elapsed,
            bytes_per_second,
            bytes_per_second_sharp: self.samples.back().copied().unwrap_or(0.0),
            total,
            remaining,
        }
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.finished_at.or(self.paused_at).unwrap_or(now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
    }

    fn mean_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        if mean <= f64::EPSILON { 0.0 } else { mean }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn update_before_start_fails() {
        let mut t = Transfer::new(Some(10));
        assert_eq!(t.update_bytes(1), Err(TelemetryError::NotStarted));
        assert_eq!(t.bytes_completed(), 0);
    }

    #[test]
    fn converges_to_complete() {
        let t0 = Instant::now();
        let mut t = Transfer::new(Some(1000));
        t.start_at(t0);

        t.update_bytes_at(250, t0 + ms(100)).unwrap();
        t.update_bytes_at(500, t0 + ms(200)).unwrap();
        let mid = t.stats_at(t0 + ms(200));
        assert!(close(mid.percentage.unwrap(), 0.5));
        assert!(close(mid.bytes_per_second, 2500.0));
        assert_eq!(mid.elapsed, ms(200));
        let remaining = mid.remaining.unwrap();
        assert!(remaining > ms(190) && remaining < ms(210));

        t.update_bytes_at(750, t0 + ms(300)).unwrap();
        t.update_bytes_at(1000, t0 + ms(400)).unwrap();
        let done = t.stats_at(t0 + ms(400));
        assert!(close(done.percentage.unwrap(), 1.0));
        assert_eq!(done.bytes_remaining, Some(0));
        assert_eq!(done.remaining, Some(Duration::ZERO));

        t.finish_at(t0 + ms(450));
        let finished = t.stats_at(t0 + ms(5000));
        assert!(finished.finished && !finished.paused);
        assert_eq!(finished.elapsed, ms(450));
        assert_eq!(t.update_bytes_at(1000, t0 + ms(500)), Err(TelemetryError::Finished));
    }

    #[test]
    fn pause_does_not_produce_a_rate_spike() {
        let t0 = Instant::now();
        let mut t = Transfer::new(Some(10_000));
        t.start_at(t0);
        t.update_bytes_at(100, t0 + ms(100)).unwrap();

        t.pause_at(t0 + ms(200));
        let paused = t.stats_at(t0 + ms(5000));
        assert!(paused.paused);
        assert_eq!(paused.bytes_completed, 100);
        assert_eq!(paused.bytes_per_second, 0.0);
        assert_eq!(paused.elapsed, ms(200));

        t.resume_at(t0 + ms(10_000));
        assert_eq!(t.bytes_completed(), 100);

        t.update_bytes_at(200, t0 + ms(10_100)).unwrap();
        let after = t.stats_at(t0 + ms(10_100));
        assert!(close(after.bytes_per_second, 1000.0));
        assert!(close(after.bytes_per_second_sharp, 1000.0));
        assert_eq!(after.elapsed, ms(300));
    }

    #[test]
    fn window_keeps_recent_samples() {
        let t0 = Instant::now();
        let mut t = Transfer::new(None);
        t.start_at(t0);
        let mut bytes = 0;
        for i in 1..=5 {
            bytes += 1000;
            t.update_bytes_at(bytes, t0 + ms(i * 1000)).unwrap();
        }
        for i in 6..=10 {
            bytes += 3000;
            t.update_bytes_at(bytes, t0 + ms(i * 1000)).unwrap();
        }
        let stats = t.stats_at(t0 + ms(10_000));
        assert!(close(stats.bytes_per_second, 3000.0));
        assert!(stats.percentage.is_none());
        assert!(stats.total.is_none());
        assert!(stats.remaining.is_none());
    }

    #[test]
    fn same_instant_updates_fold_into_next_sample() {
        let t0 = Instant::now();
        let mut t = Transfer::new(Some(1000));
        t.start_at(t0);
        t.update_bytes_at(100, t0).unwrap();
        t.update_bytes_at(200, t0 + ms(1000)).unwrap();
        assert!(close(t.stats_at(t0 + ms(1000)).bytes_per_second, 200.0));
    }

    #[test]
    fn repeated_same_instant_updates_keep_their_bytes() {
        let t0 = Instant::now();
        let mut t = Transfer::new(None);
        t.start_at(t0);
        t.update_bytes_at(500, t0 + ms(1000)).unwrap();
        t.update_bytes_at(600, t0 + ms(1000)).unwrap();
        t.update_bytes_at(700, t0 + ms(1000)).unwrap();
        t.update_bytes_at(1200, t0 + ms(2000)).unwrap();
        let stats = t.stats_at(t0 + ms(2000));
        assert!(close(stats.bytes_per_second_sharp, 700.0));
        assert!(close(stats.bytes_per_second, 600.0));
    }
}

use crate::metrics::history::HistoricalRun;
use crate::metrics::MetricsError;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Smallest interval used as a rate denominator
pub const MIN_TIME_SLICE: Duration = Duration::from_millis(100);

/// Cumulative counters of one run
///
/// Every page request is one HTTP attempt; there are no retries, so the number
/// of attempts is also the number of pages processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub pages_fetched: u64,
    pub http_attempts: u64,
    pub http_successes: u64,
    pub http_failures: u64,
    pub topics_found: u64,
    pub topics_committed: u64,
    pub bytes_archived: u64,
    /// Pages the run expects to process, once known
    ///
    /// Grows as each section is planned, so on its own it only covers the
    /// sections reached so far.
    pub expected_pages: Option<u64>,
    /// Sections this run intends to scan
    pub sections_total: u64,
    /// Sections whose scan has begun
    pub sections_started: u64,
}

impl Counters {
    pub fn pages_processed(&self) -> u64 {
        self.http_attempts
    }

    /// Expected pages of the whole run
    ///
    /// Sections not started yet are assumed to cost as many pages as the
    /// average started one.
    pub fn projected_pages(&self) -> Option<u64> {
        let expected = self.expected_pages?;
        let unstarted = self.sections_total.saturating_sub(self.sections_started);
        if unstarted == 0 || self.sections_started == 0 {
            return Some(expected);
        }
        let per_section = expected as f64 / self.sections_started as f64;
        Some(expected + (per_section * unstarted as f64).round() as u64)
    }

    pub fn remaining_pages(&self) -> Option<u64> {
        self.projected_pages()
            .map(|projected| projected.saturating_sub(self.pages_processed()))
    }
}

/// Rates derived at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct RateSample {
    pub elapsed: Duration,
    /// Pages per second since the previous sample
    pub current_rate: f64,
    /// Pages per second since the run started
    pub average_rate: f64,
    pub counters: Counters,
}

#[derive(Debug)]
struct Inner {
    counters: Counters,
    last_sample: (Instant, u64),
}

/// Shared metrics block of a run
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a metrics block whose clock started at `started`
    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            inner: Mutex::new(Inner {
                counters: Counters::default(),
                last_sample: (started, 0),
            }),
        }
    }

    // A panic while holding the lock cannot leave the counters inconsistent
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_http_success(&self) {
        let mut inner = self.lock();
        inner.counters.http_attempts += 1;
        inner.counters.http_successes += 1;
        inner.counters.pages_fetched += 1;
    }

    pub fn record_http_failure(&self) {
        let mut inner = self.lock();
        inner.counters.http_attempts += 1;
        inner.counters.http_failures += 1;
    }

    pub fn record_topics_found(&self, count: usize) {
        self.lock().counters.topics_found += count as u64;
    }

    pub fn record_topics_committed(&self, count: usize) {
        self.lock().counters.topics_committed += count as u64;
    }

    pub fn record_bytes_archived(&self, bytes: usize) {
        self.lock().counters.bytes_archived += bytes as u64;
    }

    /// Replaces the expected page total
    pub fn set_expected_pages(&self, pages: u64) {
        self.lock().counters.expected_pages = Some(pages);
    }

    /// Adds to the expected page total, setting it if it was unset
    pub fn add_expected_pages(&self, pages: u64) {
        let mut inner = self.lock();
        let expected = inner.counters.expected_pages.get_or_insert(0);
        *expected += pages;
    }

    /// Sets how many sections the run will scan
    pub fn set_sections_total(&self, sections: u64) {
        self.lock().counters.sections_total = sections;
    }

    pub fn record_section_started(&self) {
        self.lock().counters.sections_started += 1;
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters.clone()
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Derives current and average rates and starts a new sampling interval
    pub fn sample_at(&self, now: Instant) -> RateSample {
        let mut inner = self.lock();
        let counters = inner.counters.clone();
        let processed = counters.pages_processed();

        let (last_at, last_processed) = inner.last_sample;
        let interval = now.saturating_duration_since(last_at).max(MIN_TIME_SLICE);
        let current_rate =
            processed.saturating_sub(last_processed) as f64 / interval.as_secs_f64();

        let elapsed = self.elapsed_at(now);
        let average_rate = processed as f64 / elapsed.max(MIN_TIME_SLICE).as_secs_f64();

        inner.last_sample = (now, processed);

        RateSample {
            elapsed,
            current_rate,
            average_rate,
            counters,
        }
    }

    /// Estimated time until the run has processed every projected page
    ///
    /// Uses [`Counters::projected_pages`], so sections not planned yet count
    /// towards the estimate at the average size of those already started.
    ///
    /// # Errors
    ///
    /// `TotalsUnset` if no expected total was recorded, `NoThroughput` if
    /// pages remain but none has been processed.
    pub fn etc_at(&self, now: Instant) -> Result<Duration, MetricsError> {
        let counters = self.counters();
        let remaining = counters.remaining_pages().ok_or(MetricsError::TotalsUnset)?;
        if remaining == 0 {
            return Ok(Duration::ZERO);
        }

        let elapsed = self.elapsed_at(now).max(MIN_TIME_SLICE);
        let average_rate = counters.pages_processed() as f64 / elapsed.as_secs_f64();
        if average_rate <= 0.0 {
            return Err(MetricsError::NoThroughput);
        }

        Ok(Duration::from_secs_f64(remaining as f64 / average_rate))
    }

    /// Logs a one-line progress report with rates and ETC
    pub fn log_progress(&self) {
        let now = Instant::now();
        let sample = self.sample_at(now);
        let counters = &sample.counters;

        let etc = match self.etc_at(now) {
            Ok(etc) => format!("{}s", etc.as_secs()),
            Err(e) => e.to_string(),
        };

        tracing::info!(
            "Pages {}/{} (~{} projected, {} failed), {} topics found | {:.2} pages/s now, {:.2} avg | ETC {}",
            counters.pages_processed(),
            counters
                .expected_pages
                .map_or_else(|| "?".to_string(), |e| e.to_string()),
            counters
                .projected_pages()
                .map_or_else(|| "?".to_string(), |p| p.to_string()),
            counters.http_failures,
            counters.topics_found,
            sample.current_rate,
            sample.average_rate,
            etc
        );
    }

    /// Snapshot of this run for the history log
    pub fn historical_run(
        &self,
        run_id: &str,
        finished_at: DateTime<Utc>,
        now: Instant,
    ) -> HistoricalRun {
        let counters = self.counters();
        let elapsed = self.elapsed_at(now);
        let secs = elapsed.max(MIN_TIME_SLICE).as_secs_f64();

        HistoricalRun {
            timestamp: finished_at.to_rfc3339(),
            run_id: run_id.to_string(),
            duration_secs: elapsed.as_secs_f64(),
            pages_archived: counters.pages_fetched,
            topics_archived: counters.topics_committed,
            bytes_archived: counters.bytes_archived,
            avg_pages_per_sec: counters.pages_processed() as f64 / secs,
            avg_topics_per_sec: counters.topics_committed as f64 / secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_http_success();
        metrics.record_http_success();
        metrics.record_http_failure();
        metrics.record_topics_found(30);
        metrics.record_topics_committed(25);
        metrics.record_bytes_archived(4096);

        let c = metrics.counters();
        assert_eq!(c.http_attempts, 3);
        assert_eq!(c.http_successes, 2);
        assert_eq!(c.http_failures, 1);
        assert_eq!(c.pages_fetched, 2);
        assert_eq!(c.topics_found, 30);
        assert_eq!(c.topics_committed, 25);
        assert_eq!(c.bytes_archived, 4096);
        assert_eq!(c.expected_pages, None);
    }

    #[test]
    fn test_rates() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        for _ in 0..10 {
            metrics.record_http_success();
        }

        let first = metrics.sample_at(start + secs(5));
        assert!((first.current_rate - 2.0).abs() < 1e-9);
        assert!((first.average_rate - 2.0).abs() < 1e-9);

        for _ in 0..10 {
            metrics.record_http_success();
        }
        let second = metrics.sample_at(start + secs(7));
        assert!((second.current_rate - 5.0).abs() < 1e-9);
        assert!((second.average_rate - 20.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_time_slice_is_clamped() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        metrics.record_http_success();

        let sample = metrics.sample_at(start);
        assert!(sample.current_rate.is_finite());
        assert!((sample.current_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_etc() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        metrics.set_expected_pages(30);
        for _ in 0..10 {
            metrics.record_http_success();
        }

        let etc = metrics.etc_at(start + secs(10)).unwrap();
        assert_eq!(etc, secs(20));
    }

    #[test]
    fn test_etc_covers_unplanned_sections() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        metrics.set_sections_total(4);

        metrics.record_section_started();
        metrics.add_expected_pages(10);
        for _ in 0..10 {
            metrics.record_http_success();
        }

        // One section of ten pages done, three more of the same size to go
        let counters = metrics.counters();
        assert_eq!(counters.expected_pages, Some(10));
        assert_eq!(counters.projected_pages(), Some(40));
        assert_eq!(metrics.etc_at(start + secs(10)).unwrap(), secs(30));

        metrics.record_section_started();
        metrics.add_expected_pages(30);
        assert_eq!(metrics.counters().projected_pages(), Some(80));

        metrics.record_section_started();
        metrics.record_section_started();
        assert_eq!(metrics.counters().projected_pages(), Some(40));
    }

    #[test]
    fn test_etc_errors() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        assert!(matches!(
            metrics.etc_at(start + secs(1)),
            Err(MetricsError::TotalsUnset)
        ));

        metrics.add_expected_pages(5);
        assert!(matches!(
            metrics.etc_at(start + secs(1)),
            Err(MetricsError::NoThroughput)
        ));
    }

    #[test]
    fn test_etc_zero_when_done() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        metrics.add_expected_pages(1);
        metrics.add_expected_pages(1);
        metrics.record_http_success();
        metrics.record_http_failure();
        metrics.record_http_success();

        assert_eq!(metrics.etc_at(start + secs(3)).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let metrics = Arc::new(Metrics::new());
        let writer = {
            let metrics = Arc::clone(&metrics);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.record_http_success();
                }
            })
        };
        for _ in 0..100 {
            let _ = metrics.sample_at(Instant::now());
        }
        writer.join().unwrap();
        assert_eq!(metrics.counters().pages_fetched, 1000);
    }

    #[test]
    fn test_historical_run() {
        let start = Instant::now();
        let metrics = Metrics::starting_at(start);
        for _ in 0..8 {
            metrics.record_http_success();
        }
        metrics.record_topics_committed(40);
        metrics.record_bytes_archived(2048);

        let run = metrics.historical_run("run-1", Utc::now(), start + secs(4));
        assert_eq!(run.run_id, "run-1");
        assert_eq!(run.pages_archived, 8);
        assert_eq!(run.topics_archived, 40);
        assert_eq!(run.bytes_archived, 2048);
        assert!((run.avg_pages_per_sec - 2.0).abs() < 1e-9);
        assert!((run.avg_topics_per_sec - 10.0).abs() < 1e-9);
        assert!((run.duration_secs - 4.0).abs() < 1e-9);
    }
}

//! Latency and throughput statistics for one prompt exchange.

use std::fmt;
use std::time::{Duration, Instant};

use super::streaming::ContentFragment;

/// Timing summary of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Request start to first non-empty fragment; `None` if nothing arrived.
    pub first_token_latency: Option<Duration>,
    /// Request start to stream completion.
    pub total_latency: Duration,
    /// Non-empty fragments received, regardless of their length.
    pub token_count: usize,
    /// `token_count / total_latency`, or 0 when the latency is zero.
    pub tokens_per_second: f64,
}

impl Stats {
    /// `key=value` lines for scripts.
    pub fn to_plain(&self) -> String {
        let first = self
            .first_token_latency
            .map(|d| format!("{:.3}", d.as_secs_f64()))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "first_token_latency={first}\n\
             total_latency={:.3}\n\
             token_count={}\n\
             tokens_per_second={:.2}",
            self.total_latency.as_secs_f64(),
            self.token_count,
            self.tokens_per_second
        )
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first_token_latency {
            Some(d) => write!(f, "First token: {:.2}s", d.as_secs_f64())?,
            None => write!(f, "First token: n/a")?,
        }
        write!(
            f,
            " | Total: {:.2}s | Tokens: {} | Speed: {:.1} tokens/s",
            self.total_latency.as_secs_f64(),
            self.token_count,
            self.tokens_per_second
        )
    }
}

/// Accumulates fragment arrivals for one request.
///
/// Only created when statistics were requested, so the default path
/// records no timestamps at all.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    started: Instant,
    first_token: Option<Instant>,
    token_count: usize,
}

impl StatsCollector {
    /// Start timing now.
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            first_token: None,
            token_count: 0,
        }
    }

    /// Count a fragment. Empty fragments are not tokens.
    pub fn record(&mut self, fragment: &ContentFragment) {
        if fragment.text.is_empty() {
            return;
        }
        let at = fragment.timestamp.unwrap_or_else(Instant::now);
        self.first_token.get_or_insert(at);
        self.token_count += 1;
    }

    /// Close the measurement at `completed_at`.
    pub fn finish(&self, completed_at: Instant) -> Stats {
        build_stats(self.started, self.first_token, self.token_count, completed_at)
    }
}

/// Compute [`Stats`] from the arrival times of non-empty fragments.
pub fn compute_stats(start: Instant, token_times: &[Instant], completed_at: Instant) -> Stats {
    build_stats(start, token_times.first().copied(), token_times.len(), completed_at)
}

fn build_stats(
    start: Instant,
    first_token: Option<Instant>,
    token_count: usize,
    completed_at: Instant,
) -> Stats {
    let total_latency = completed_at.saturating_duration_since(start);
    // Clamped so first_token_latency <= total_latency always holds.
    let first_token_latency =
        first_token.map(|t| t.min(completed_at).saturating_duration_since(start));
    let tokens_per_second = if total_latency.is_zero() {
        0.0
    } else {
        token_count as f64 / total_latency.as_secs_f64()
    };

    Stats {
        first_token_latency,
        total_latency,
        token_count,
        tokens_per_second,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, at: Instant) -> ContentFragment {
        ContentFragment {
            text: text.to_string(),
            timestamp: Some(at),
        }
    }

    #[test]
    fn test_counts_non_empty_fragments() {
        let start = Instant::now();
        let mut collector = StatsCollector::starting_at(start);
        collector.record(&fragment("", start + Duration::from_millis(50)));
        collector.record(&fragment("Hello", start + Duration::from_millis(100)));
        collector.record(&fragment(" a much longer fragment", start + Duration::from_millis(200)));

        let stats = collector.finish(start + Duration::from_secs(1));
        assert_eq!(stats.token_count, 2);
        assert_eq!(stats.first_token_latency, Some(Duration::from_millis(100)));
        assert_eq!(stats.total_latency, Duration::from_secs(1));
        assert!((stats.tokens_per_second - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_fragments() {
        let start = Instant::now();
        let stats = StatsCollector::starting_at(start).finish(start + Duration::from_millis(500));
        assert_eq!(stats.token_count, 0);
        assert!(stats.first_token_latency.is_none());
        assert_eq!(stats.tokens_per_second, 0.0);
    }

    #[test]
    fn test_zero_total_latency() {
        let start = Instant::now();
        let stats = compute_stats(start, &[start, start], start);
        assert_eq!(stats.total_latency, Duration::ZERO);
        assert_eq!(stats.tokens_per_second, 0.0);
        assert_eq!(stats.token_count, 2);
    }

    #[test]
    fn test_first_token_never_exceeds_total() {
        let start = Instant::now();
        let late = start + Duration::from_secs(3);
        let stats = compute_stats(start, &[late], start + Duration::from_secs(2));
        assert!(stats.first_token_latency.unwrap() <= stats.total_latency);
    }

    #[test]
    fn test_invariants_over_many_streams() {
        let start = Instant::now();
        for n in 0..20u64 {
            let times: Vec<Instant> = (1..=n)
                .map(|i| start + Duration::from_millis(i * 10))
                .collect();
            let completed = start + Duration::from_millis(n * 10 + 5);
            let stats = compute_stats(start, &times, completed);

            assert_eq!(stats.token_count, n as usize);
            let expected = n as f64 / stats.total_latency.as_secs_f64();
            assert!((stats.tokens_per_second - expected).abs() < 1e-9);
            if let Some(first) = stats.first_token_latency {
                assert!(first <= stats.total_latency);
            }
        }
    }

    #[test]
    fn test_display_and_plain() {
        let stats = Stats {
            first_token_latency: Some(Duration::from_millis(250)),
            total_latency: Duration::from_secs(2),
            token_count: 40,
            tokens_per_second: 20.0,
        };
        assert_eq!(
            stats.to_string(),
            "First token: 0.25s | Total: 2.00s | Tokens: 40 | Speed: 20.0 tokens/s"
        );
        assert!(stats.to_plain().contains("token_count=40"));
        assert!(stats.to_plain().contains("first_token_latency=0.250"));
    }
}

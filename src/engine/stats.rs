//! Point-in-time queue statistics and the completion throughput window.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::model::WorkItem;

/// Completions are counted over this trailing window (items/minute).
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

/// Completions kept for the hourly per-minute average.
pub const THROUGHPUT_HOUR: Duration = Duration::from_secs(3600);

/// Fixed reporting bands over the 0-99 priority range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityBand {
    /// 0-10
    Critical,
    /// 11-30
    High,
    /// 31-60
    Medium,
    /// 61-90
    Low,
    /// 91-99
    Background,
}

impl PriorityBand {
    pub fn of(priority: u8) -> Self {
        match priority {
            0..=10 => PriorityBand::Critical,
            11..=30 => PriorityBand::High,
            31..=60 => PriorityBand::Medium,
            61..=90 => PriorityBand::Low,
            _ => PriorityBand::Background,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityBand::Critical => "critical",
            PriorityBand::High => "high",
            PriorityBand::Medium => "medium",
            PriorityBand::Low => "low",
            PriorityBand::Background => "background",
        }
    }
}

/// Item counts per [`PriorityBand`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityBands {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub background: usize,
}

impl PriorityBands {
    fn add(&mut self, priority: u8) {
        let slot = match PriorityBand::of(priority) {
            PriorityBand::Critical => &mut self.critical,
            PriorityBand::High => &mut self.high,
            PriorityBand::Medium => &mut self.medium,
            PriorityBand::Low => &mut self.low,
            PriorityBand::Background => &mut self.background,
        };
        *slot += 1;
    }
}

/// Queue health at one instant. Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_items: usize,
    pub unclaimed_items: usize,
    pub claimed_items: usize,
    pub priority_bands: PriorityBands,
    /// Mean of `claimed_at - enqueued_at` over claimed items.
    pub average_wait_time: f64,
    /// Successful completions in the trailing minute.
    pub throughput: usize,
    pub oldest_item_age: u64,
    pub stale_claims: usize,
}

impl QueueStats {
    /// Compute from a snapshot of items at `now`.
    pub fn compute(
        items: &[WorkItem],
        now: DateTime<Utc>,
        stale_claim_timeout: Duration,
        throughput: usize,
    ) -> Self {
        let mut stats = QueueStats {
            total_items: items.len(),
            throughput,
            ..Default::default()
        };

        let mut wait_total_ms = 0i64;
        let mut oldest: Option<DateTime<Utc>> = None;

        for item in items {
            stats.priority_bands.add(item.priority);
            oldest = Some(oldest.map_or(item.enqueued_at, |o| o.min(item.enqueued_at)));

            match &item.claim {
                None => stats.unclaimed_items += 1,
                Some(claim) => {
                    stats.claimed_items += 1;
                    wait_total_ms += (claim.claimed_at - item.enqueued_at).num_milliseconds();
                    if claim.age(now) > stale_claim_timeout {
                        stats.stale_claims += 1;
                    }
                }
            }
        }

        if stats.claimed_items > 0 {
            stats.average_wait_time = wait_total_ms as f64 / stats.claimed_items as f64;
        }
        if let Some(oldest) = oldest {
            stats.oldest_item_age = (now - oldest).num_milliseconds().max(0) as u64;
        }
        stats
    }
}

/// [`QueueStats`] as the dashboard receives it, with the last-success time,
/// the hourly throughput average and the `avgWait` alias of `averageWaitTime`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    #[serde(flatten)]
    pub stats: QueueStats,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_success: Option<DateTime<Utc>>,
    pub avg_wait: f64,
    /// Successful completions per minute, averaged over the trailing hour.
    pub throughput_hour: usize,
}

impl StatsReport {
    pub fn new(
        stats: QueueStats,
        last_success: Option<DateTime<Utc>>,
        throughput_hour: usize,
    ) -> Self {
        let avg_wait = stats.average_wait_time;
        Self {
            stats,
            last_success,
            avg_wait,
            throughput_hour,
        }
    }
}

/// Rolling window of completion timestamps.
#[derive(Debug, Default)]
pub struct ThroughputTracker {
    completions: VecDeque<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.completions.push_back(at);
        self.last_success = Some(at);
        self.prune(at);
    }

    /// Completions inside the minute ending at `now`.
    pub fn per_minute(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        let cutoff = cutoff(now, THROUGHPUT_WINDOW);
        self.completions.iter().rev().take_while(|&&t| t > cutoff).count()
    }

    /// Per-minute completions averaged over the hour ending at `now`, rounded.
    pub fn per_hour_avg(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        (self.completions.len() as f64 / 60.0).round() as usize
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = cutoff(now, THROUGHPUT_HOUR);
        while self.completions.front().is_some_and(|&t| t <= cutoff) {
            self.completions.pop_front();
        }
    }
}

fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

//! # Request Monitor
//!
//! Bounded history of completed request outcomes. A fixed-capacity ring
//! keeps the most recent records (oldest evicted first) and backs the
//! `/_gateway/stats` endpoint; running totals per handler and global
//! survive eviction. An empty buffer — or a filter that matches nothing —
//! yields an explicit no-data report instead of dividing by zero.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::core::types::HandlerId;

/// The trailing interval reported as "requests per minute".
const RECENT_WINDOW: Duration = Duration::from_secs(60);

/// One completed request outcome. Read-only after creation.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub recorded_at: Instant,
    pub duration: Duration,
    pub status: u16,
    pub handler_id: HandlerId,
}

/// Lifetime counters, unaffected by ring eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalCounters {
    pub requests: u64,
    pub errors: u64,
}

/// Aggregates over the (optionally filtered) ring buffer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_id: Option<HandlerId>,
    pub total_requests: usize,
    /// Seconds
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    /// Records within the trailing 60 seconds
    pub requests_per_minute: usize,
    /// Percentage of records with status >= 400
    pub error_rate: f64,
}

/// `stats()` result: either aggregates or an explicit no-data message.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StatsReport {
    Summary(StatsSummary),
    NoData { message: String },
}

#[derive(Debug, Default)]
struct MonitorInner {
    records: VecDeque<MetricRecord>,
    global_totals: TotalCounters,
    handler_totals: HashMap<HandlerId, TotalCounters>,
}

/// Ring buffer plus totals behind a single short-lived lock.
#[derive(Debug)]
pub struct RequestMonitor {
    capacity: usize,
    inner: Mutex<MonitorInner>,
}

impl RequestMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    /// Append one outcome, evicting the oldest record at capacity.
    pub fn record(&self, handler_id: HandlerId, duration: Duration, status: u16) {
        let mut inner = self.inner.lock();
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(MetricRecord {
            recorded_at: Instant::now(),
            duration,
            status,
            handler_id,
        });

        inner.global_totals.requests += 1;
        let handler_totals = inner.handler_totals.entry(handler_id).or_default();
        handler_totals.requests += 1;
        if status >= 400 {
            handler_totals.errors += 1;
            inner.global_totals.errors += 1;
        }
    }

    /// Aggregates over the buffer, optionally scoped to one handler.
    pub fn stats(&self, handler_id: Option<HandlerId>) -> StatsReport {
        let inner = self.inner.lock();
        let records: Vec<&MetricRecord> = inner
            .records
            .iter()
            .filter(|r| handler_id.map_or(true, |id| r.handler_id == id))
            .collect();

        if records.is_empty() {
            let message = match handler_id {
                Some(id) => format!("no data recorded for handler {id}"),
                None => "no data recorded".to_string(),
            };
            return StatsReport::NoData { message };
        }

        let now = Instant::now();
        let total = records.len();
        let durations: Vec<f64> = records.iter().map(|r| r.duration.as_secs_f64()).collect();
        let sum: f64 = durations.iter().sum();
        let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = durations.iter().copied().fold(0.0_f64, f64::max);
        let recent = records
            .iter()
            .filter(|r| now.duration_since(r.recorded_at) < RECENT_WINDOW)
            .count();
        let errors = records.iter().filter(|r| r.status >= 400).count();

        StatsReport::Summary(StatsSummary {
            handler_id,
            total_requests: total,
            avg_duration: sum / total as f64,
            min_duration: min,
            max_duration: max,
            requests_per_minute: recent,
            error_rate: errors as f64 / total as f64 * 100.0,
        })
    }

    /// Lifetime global counters.
    pub fn totals(&self) -> TotalCounters {
        self.inner.lock().global_totals
    }

    /// Lifetime counters for one handler.
    pub fn handler_totals(&self, handler_id: HandlerId) -> TotalCounters {
        self.inner
            .lock()
            .handler_totals
            .get(&handler_id)
            .copied()
            .unwrap_or_default()
    }

    /// Records currently held in the ring.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

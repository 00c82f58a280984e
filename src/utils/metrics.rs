use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::collections::HashMap;
use parking_lot::RwLock;

pub const ACQUIRED: &str = "pool.acquired";
pub const RELEASED: &str = "pool.released";
pub const DROPPED_UNRELEASED: &str = "pool.dropped_unreleased";
pub const TIMEOUTS: &str = "pool.timeouts";
pub const IDLE: &str = "pool.idle";
pub const IN_USE: &str = "pool.in_use";
pub const WAITING: &str = "pool.waiting";
pub const WAIT_MS: &str = "pool.wait_ms";

/// Named counters, gauges and histograms. Each pool owns its own instance.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, Arc<AtomicI64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicUsize>>>,
    histograms: RwLock<HashMap<String, Arc<(AtomicUsize, AtomicUsize)>>>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("counters", &self.get_counters())
            .field("gauges", &self.get_gauges())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, name: &str) -> Arc<AtomicI64> {
        if let Some(counter) = self.counters.read().get(name) {
            return counter.clone();
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    fn gauge(&self, name: &str) -> Arc<AtomicUsize> {
        if let Some(gauge) = self.gauges.read().get(name) {
            return gauge.clone();
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone()
    }

    pub fn increment_counter(&self, name: &str) {
        self.counter(name).fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, value: usize) {
        self.gauge(name).store(value, Ordering::Relaxed);
    }

    pub fn increment_gauge(&self, name: &str) -> usize {
        self.gauge(name).fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Saturates at zero.
    pub fn decrement_gauge(&self, name: &str) -> usize {
        let gauge = self.gauge(name);
        let prev = gauge
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub fn update_histogram(&self, name: &str, value: f64) {
        let histogram = {
            let histograms = self.histograms.read();
            histograms.get(name).cloned()
        };
        let histogram = histogram.unwrap_or_else(|| {
            self.histograms
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new((AtomicUsize::new(0), AtomicUsize::new(0))))
                .clone()
        });

        let (sum, count) = &*histogram;
        sum.fetch_add(value as usize, Ordering::Relaxed);
        count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_counter(&self, name: &str) -> i64 {
        self.counters
            .read()
            .get(name)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn get_gauge(&self, name: &str) -> usize {
        self.gauges
            .read()
            .get(name)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn get_counters(&self) -> HashMap<String, i64> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn get_gauges(&self) -> HashMap<String, usize> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn get_histograms(&self) -> HashMap<String, (f64, usize)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| {
                let sum = v.0.load(Ordering::Relaxed) as f64;
                let count = v.1.load(Ordering::Relaxed);
                (k.clone(), (sum, count))
            })
            .collect()
    }
}

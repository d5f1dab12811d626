//! Request and render metrics.
//!
//! Every recording goes to the `metrics` facade (scraped at `/metrics`) and
//! to in-process counters served as JSON at `/debug/vars`. Only the
//! in-process counters can be reset.

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone, Copy)]
struct TimingStats {
    count: u64,
    total_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.add_time(duration);
    }

    fn add_time(&mut self, duration: Duration) {
        self.total_us += duration.as_micros() as u64;
    }

    fn total_ms(&self) -> f64 {
        self.total_us as f64 / 1000.0
    }
}

/// Metrics collector for the tile server.
#[derive(Debug)]
pub struct TileMetrics {
    /// Keyed by request path
    requests: RwLock<HashMap<String, TimingStats>>,
    /// Keyed by tile size
    tiles: RwLock<HashMap<u32, TimingStats>>,
    subtiles_ok: AtomicU64,
    subtiles_failed: AtomicU64,
    start_time: Instant,
}

/// JSON view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub hostname: String,
    pub uptime_secs: u64,
    pub request_counts: BTreeMap<String, u64>,
    pub request_time_ms: BTreeMap<String, f64>,
    pub tile_counts: BTreeMap<u32, u64>,
    pub tile_time_ms: BTreeMap<u32, f64>,
    pub subtile_fetches_ok: u64,
    pub subtile_fetches_failed: u64,
    pub smooth_value_min: Option<f64>,
    pub smooth_value_max: Option<f64>,
}

impl Default for TileMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TileMetrics {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            tiles: RwLock::new(HashMap::new()),
            subtiles_ok: AtomicU64::new(0),
            subtiles_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one HTTP request on `path`.
    pub async fn record_request(&self, path: &str, elapsed: Duration) {
        counter!("http_requests_total", "path" => path.to_string()).increment(1);
        histogram!("http_request_duration_ms", "path" => path.to_string())
            .record(elapsed.as_secs_f64() * 1000.0);

        let mut requests = self.requests.write().await;
        requests.entry(path.to_string()).or_default().record(elapsed);
    }

    /// Count a tile request that passed validation, before it is rendered.
    pub async fn record_tile_started(&self, tile_size: u32) {
        counter!("tiles_requested_total", "tile_size" => tile_size.to_string()).increment(1);

        let mut tiles = self.tiles.write().await;
        tiles.entry(tile_size).or_default().count += 1;
    }

    /// Add the render and encode time of a tile that was served.
    pub async fn record_tile_finished(&self, tile_size: u32, elapsed: Duration) {
        histogram!("tile_render_duration_ms", "tile_size" => tile_size.to_string())
            .record(elapsed.as_secs_f64() * 1000.0);

        let mut tiles = self.tiles.write().await;
        tiles.entry(tile_size).or_default().add_time(elapsed);
    }

    /// Record the outcome of one composite's sub-tile fetches.
    pub fn record_subtiles(&self, succeeded: usize, failed: usize) {
        self.subtiles_ok.fetch_add(succeeded as u64, Ordering::Relaxed);
        self.subtiles_failed.fetch_add(failed as u64, Ordering::Relaxed);
        counter!("subtile_fetches_total", "outcome" => "ok").increment(succeeded as u64);
        counter!("subtile_fetches_total", "outcome" => "failed").increment(failed as u64);
    }

    /// Publish the colorer's observed smooth-value range as gauges.
    pub fn record_value_range(&self, range: Option<(f64, f64)>) {
        if let Some((min, max)) = range {
            gauge!("colorer_smooth_value_min").set(min);
            gauge!("colorer_smooth_value_max").set(max);
        }
    }

    pub async fn reset(&self) {
        self.requests.write().await.clear();
        self.tiles.write().await.clear();
        self.subtiles_ok.store(0, Ordering::Relaxed);
        self.subtiles_failed.store(0, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub async fn snapshot(&self, value_range: Option<(f64, f64)>) -> MetricsSnapshot {
        let requests = self.requests.read().await;
        let tiles = self.tiles.read().await;

        MetricsSnapshot {
            hostname: hostname(),
            uptime_secs: self.uptime().as_secs(),
            request_counts: requests.iter().map(|(k, v)| (k.clone(), v.count)).collect(),
            request_time_ms: requests.iter().map(|(k, v)| (k.clone(), v.total_ms())).collect(),
            tile_counts: tiles.iter().map(|(k, v)| (*k, v.count)).collect(),
            tile_time_ms: tiles.iter().map(|(k, v)| (*k, v.total_ms())).collect(),
            subtile_fetches_ok: self.subtiles_ok.load(Ordering::Relaxed),
            subtile_fetches_failed: self.subtiles_failed.load(Ordering::Relaxed),
            smooth_value_min: value_range.map(|(min, _)| min),
            smooth_value_max: value_range.map(|(_, max)| max),
        }
    }
}

/// Host name from `HOSTNAME`, falling back to /etc/hostname.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

//! Metrics module
//!
//! Prometheus counters and histograms for transfers. The CLI can write them
//! in the text exposition format on exit (`--metrics-out`), which suits
//! node-exporter style textfile collection for batch jobs.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};
use std::path::Path;

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "runpilot_uploads_total",
        "Total number of uploads",
        &["target", "status"]
    ).unwrap();

    pub static ref UPLOAD_CHUNKS_TOTAL: CounterVec = register_counter_vec!(
        "runpilot_upload_chunks_total",
        "Total number of acknowledged chunks",
        &["target"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "runpilot_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    // Download metrics
    pub static ref DOWNLOADS_TOTAL: CounterVec = register_counter_vec!(
        "runpilot_downloads_total",
        "Total number of downloads",
        &["mode", "status"]  // mode: "ranged", "buffered", "inline"
    ).unwrap();

    pub static ref DOWNLOAD_BYTES_TOTAL: Counter = register_counter!(
        "runpilot_download_bytes_total",
        "Total bytes downloaded"
    ).unwrap();

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "runpilot_transfer_duration_seconds",
        "Transfer duration in seconds",
        &["direction"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0]
    ).unwrap();
}

/// Record a finished upload
pub fn record_upload(target: &str, success: bool, bytes: u64) {
    let status = if success { "success" } else { "failure" };
    UPLOADS_TOTAL.with_label_values(&[target, status]).inc();
    if success {
        UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record one acknowledged chunk
pub fn record_chunk(target: &str) {
    UPLOAD_CHUNKS_TOTAL.with_label_values(&[target]).inc();
}

/// Record a finished download
pub fn record_download(mode: &str, success: bool, bytes: u64) {
    let status = if success { "success" } else { "failure" };
    DOWNLOADS_TOTAL.with_label_values(&[mode, status]).inc();
    DOWNLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record transfer duration ("upload" or "download")
pub fn record_transfer_duration(direction: &str, duration_secs: f64) {
    TRANSFER_DURATION
        .with_label_values(&[direction])
        .observe(duration_secs);
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Write the text exposition to `path`
pub fn write_to_file(path: &Path) -> std::io::Result<()> {
    let text = gather_text().map_err(std::io::Error::other)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload() {
        let before = UPLOADS_TOTAL
            .with_label_values(&["test-target", "success"])
            .get();
        record_upload("test-target", true, 1024);
        let after = UPLOADS_TOTAL
            .with_label_values(&["test-target", "success"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_gather_text_contains_metrics() {
        record_chunk("test-gather");
        record_download("inline", true, 10);
        record_transfer_duration("download", 0.2);
        let text = gather_text().unwrap();
        assert!(text.contains("runpilot_upload_chunks_total"));
        assert!(text.contains("runpilot_downloads_total"));
    }

    #[test]
    fn test_write_to_file() {
        record_chunk("test-file");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics/runpilot.prom");
        write_to_file(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("runpilot_upload_chunks_total"));
    }
}

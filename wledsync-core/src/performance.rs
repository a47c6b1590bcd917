//! Cast performance metrics
//!
//! Tracks per-stage latency of a cast (capture, process, send) as rolling
//! averages, plus frame, packet and byte counters. The output bitrate is
//! recomputed at most every 500 ms.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maximum number of samples to keep for rolling averages
const MAX_SAMPLES: usize = 120;

/// Minimum interval between two bitrate computations
const BITRATE_WINDOW: Duration = Duration::from_millis(500);

/// Latency statistics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Average time spent grabbing a frame, in milliseconds
    pub capture_latency_ms: f64,
    /// Average time spent resizing and applying effects
    pub process_latency_ms: f64,
    /// Average time spent handing frames to the devices
    pub send_latency_ms: f64,
    pub total_latency_ms: f64,
    /// Measured frames per second
    pub fps: f64,
    /// Output bitrate in kbps
    pub bitrate_kbps: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

impl LatencyStats {
    /// Format stats as a single line
    pub fn format_overlay(&self) -> String {
        format!(
            "Capture: {:.1}ms | Process: {:.1}ms | Send: {:.1}ms | {:.1}fps | Drops: {}",
            self.capture_latency_ms,
            self.process_latency_ms,
            self.send_latency_ms,
            self.fps,
            self.frames_dropped
        )
    }

    /// Format stats as multi-line string for logging
    pub fn format_detailed(&self) -> String {
        format!(
            "Latency: capture={:.2}ms process={:.2}ms send={:.2}ms total={:.2}ms\n\
             Output: fps={:.1} bitrate={}kbps processed={} dropped={} packets={} bytes={}",
            self.capture_latency_ms,
            self.process_latency_ms,
            self.send_latency_ms,
            self.total_latency_ms,
            self.fps,
            self.bitrate_kbps,
            self.frames_processed,
            self.frames_dropped,
            self.packets_sent,
            self.bytes_sent
        )
    }
}

/// Fixed-size window of durations with a running total
#[derive(Debug)]
struct LatencyWindow {
    samples: VecDeque<Duration>,
    total: Duration,
}

impl LatencyWindow {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            total: Duration::ZERO,
        }
    }

    fn push(&mut self, sample: Duration) {
        if self.samples.len() == MAX_SAMPLES {
            if let Some(old) = self.samples.pop_front() {
                self.total -= old;
            }
        }
        self.samples.push_back(sample);
        self.total += sample;
    }

    fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|n| *n > 0)?;
        Some(self.total / n)
    }

    fn mean_ms(&self) -> f64 {
        self.mean().map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }
}

/// Timing windows of one cast
#[derive(Debug)]
struct StageTimes {
    capture: LatencyWindow,
    process: LatencyWindow,
    send: LatencyWindow,
    /// Gap between consecutive frames
    frame_gap: LatencyWindow,
}

impl StageTimes {
    fn new() -> Self {
        Self {
            capture: LatencyWindow::new(),
            process: LatencyWindow::new(),
            send: LatencyWindow::new(),
            frame_gap: LatencyWindow::new(),
        }
    }
}

#[derive(Debug)]
struct BitrateWindow {
    started: Instant,
    kbps: u64,
}

/// Performance metrics collector
///
/// Shared between the cast loop and whoever reports on it.
#[derive(Debug)]
pub struct PerformanceMetrics {
    stages: RwLock<StageTimes>,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    /// Bytes since the bitrate window started
    window_bytes: AtomicU64,
    bitrate: Mutex<BitrateWindow>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            stages: RwLock::new(StageTimes::new()),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            window_bytes: AtomicU64::new(0),
            bitrate: Mutex::new(BitrateWindow {
                started: Instant::now(),
                kbps: 0,
            }),
        }
    }

    pub fn record_capture(&self, duration: Duration) {
        self.stages.write().capture.push(duration);
    }

    pub fn record_process(&self, duration: Duration) {
        self.stages.write().process.push(duration);
    }

    pub fn record_send(&self, duration: Duration) {
        self.stages.write().send.push(duration);
    }

    /// Record the time since the previous frame
    pub fn record_frame_time(&self, duration: Duration) {
        self.stages.write().frame_gap.push(duration);
    }

    pub fn record_frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record frames that did not reach a device
    pub fn record_frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record device output, as read from the device counters
    pub fn record_output(&self, packets: u64, bytes: u64) {
        self.packets_sent.fetch_add(packets, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.window_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Current statistics
    pub fn get_stats(&self) -> LatencyStats {
        let (capture_ms, process_ms, send_ms, fps) = {
            let stages = self.stages.read();
            let fps = stages
                .frame_gap
                .mean()
                .filter(|gap| !gap.is_zero())
                .map_or(0.0, |gap| 1.0 / gap.as_secs_f64());
            (
                stages.capture.mean_ms(),
                stages.process.mean_ms(),
                stages.send.mean_ms(),
                fps,
            )
        };

        LatencyStats {
            capture_latency_ms: capture_ms,
            process_latency_ms: process_ms,
            send_latency_ms: send_ms,
            total_latency_ms: capture_ms + process_ms + send_ms,
            fps,
            bitrate_kbps: self.bitrate_kbps(),
            frames_processed: self.frames_processed(),
            frames_dropped: self.frames_dropped(),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Output bitrate, recomputed once the window has run for `BITRATE_WINDOW`
    fn bitrate_kbps(&self) -> u64 {
        let mut window = self.bitrate.lock();
        let elapsed = window.started.elapsed();
        if elapsed >= BITRATE_WINDOW {
            let bits = self.window_bytes.swap(0, Ordering::Relaxed) * 8;
            window.kbps = (bits as f64 / elapsed.as_secs_f64() / 1000.0) as u64;
            window.started = Instant::now();
        }
        window.kbps
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Clear windows and counters, as on a cast reset
    pub fn reset(&self) {
        *self.stages.write() = StageTimes::new();
        for counter in [
            &self.frames_processed,
            &self.frames_dropped,
            &self.packets_sent,
            &self.bytes_sent,
            &self.window_bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.bitrate.lock() = BitrateWindow {
            started: Instant::now(),
            kbps: 0,
        };
    }
}

/// Create a shared performance metrics instance
pub fn create_metrics() -> Arc<PerformanceMetrics> {
    Arc::new(PerformanceMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_window_keeps_last_samples() {
        let mut window = LatencyWindow::new();
        assert_eq!(window.mean(), None);

        for _ in 0..MAX_SAMPLES {
            window.push(ms(4));
        }
        // One slow frame replaces the oldest sample
        window.push(ms(4 + MAX_SAMPLES as u64));
        assert_eq!(window.samples.len(), MAX_SAMPLES);
        assert_eq!(window.mean(), Some(ms(5)));
    }

    #[test]
    fn test_stage_latencies_and_fps() {
        let metrics = create_metrics();
        metrics.record_capture(ms(6));
        metrics.record_process(ms(3));
        metrics.record_send(ms(1));
        metrics.record_frame_time(ms(40));
        metrics.record_frame_processed();

        let stats = metrics.get_stats();
        assert!((stats.total_latency_ms - 10.0).abs() < 0.01);
        assert!((stats.fps - 25.0).abs() < 0.01);
        assert_eq!(stats.frames_processed, 1);
    }

    #[test]
    fn test_no_frames_means_zero_fps() {
        let stats = PerformanceMetrics::new().get_stats();
        assert_eq!(stats.fps, 0.0);
        assert_eq!(stats.total_latency_ms, 0.0);
    }

    #[test]
    fn test_output_counters() {
        let metrics = PerformanceMetrics::new();
        metrics.record_output(3, 1500);
        metrics.record_output(1, 500);
        metrics.record_frames_dropped(2);

        let stats = metrics.get_stats();
        assert_eq!((stats.packets_sent, stats.bytes_sent), (4, 2000));
        assert_eq!(stats.frames_dropped, 2);
    }

    #[test]
    fn test_bitrate_after_window() {
        let metrics = PerformanceMetrics::new();
        metrics.bitrate.lock().started = Instant::now() - Duration::from_secs(1);
        metrics.record_output(10, 125_000);

        // 1 Mbit over about one second
        let kbps = metrics.get_stats().bitrate_kbps;
        assert!((900..=1000).contains(&kbps), "got {} kbps", kbps);
        // The window restarted, the value is held
        assert_eq!(metrics.get_stats().bitrate_kbps, kbps);
    }

    #[test]
    fn test_stats_formatting() {
        let stats = LatencyStats {
            send_latency_ms: 0.8,
            fps: 30.0,
            frames_dropped: 7,
            packets_sent: 12,
            ..Default::default()
        };
        assert_eq!(
            stats.format_overlay(),
            "Capture: 0.0ms | Process: 0.0ms | Send: 0.8ms | 30.0fps | Drops: 7"
        );
        assert!(stats.format_detailed().contains("packets=12"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let metrics = PerformanceMetrics::new();
        metrics.record_send(ms(2));
        metrics.record_frame_processed();
        metrics.record_frames_dropped(1);
        metrics.record_output(1, 10);

        metrics.reset();

        let stats = metrics.get_stats();
        assert_eq!(stats.send_latency_ms, 0.0);
        assert_eq!((stats.frames_processed, stats.frames_dropped), (0, 0));
        assert_eq!(stats.bytes_sent, 0);
    }
}

//! Realtime frame-buffer analysis under a latency budget.
//!
//! Owns a bounded sliding frame buffer, decodes base64 JPEG frames, runs
//! optical flow with adaptive dense/sparse selection, tracks the subject
//! with a placeholder edge-density detector, and measures environment
//! features on the latest frame.

use std::collections::VecDeque;
use std::time::Instant;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use tracing::debug;

use shotcoach_analysis::indicators::{motion_smoothness, IndicatorConfig};
use shotcoach_models::{now_ms, BBox, OpticalFlow, RealtimeAnalysisResult};

use crate::environment::environment_features;
use crate::flow::{dense_flow, sparse_flow};

/// Configuration for realtime analysis.
#[derive(Debug, Clone)]
pub struct RealtimeAnalyzerConfig {
    /// Sliding buffer capacity; older frames are overwritten (last-wins).
    pub buffer_capacity: usize,
    /// Minimum decoded frames for a full-confidence analysis.
    pub min_ready_frames: usize,
    /// `(width, height)` frames are resized to before analysis.
    pub target_resolution: (u32, u32),
    /// Analyze only the center region when set.
    pub center_region_only: bool,
    /// Force the sparse algorithm regardless of latency.
    pub use_sparse_flow: bool,
    /// Average latency above this switches to sparse flow.
    pub latency_threshold_ms: f64,
    /// Rolling latency history length for the adaptive switch.
    pub latency_history: usize,
    /// Consecutive frames without a detection before the subject is lost.
    pub subject_lost_threshold_frames: u32,
    /// Normalization constant for the smoothness indicator.
    pub smoothness_normalization: f64,
}

impl Default for RealtimeAnalyzerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            min_ready_frames: 5,
            target_resolution: (320, 240),
            center_region_only: false,
            use_sparse_flow: false,
            latency_threshold_ms: 500.0,
            latency_history: 5,
            subject_lost_threshold_frames: 3,
            smoothness_normalization: 100.0,
        }
    }
}

impl RealtimeAnalyzerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            latency_threshold_ms: std::env::var("SHOTCOACH_RT_LATENCY_THRESHOLD_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.latency_threshold_ms),
            center_region_only: std::env::var("SHOTCOACH_RT_CENTER_ONLY")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.center_region_only),
            ..defaults
        }
    }
}

/// Bounded sliding frame buffer; excess frames overwrite the oldest.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: VecDeque<(RgbImage, f64)>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: RgbImage, timestamp_s: f64) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back((frame, timestamp_s));
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = &RgbImage> {
        self.frames.iter().map(|(frame, _)| frame)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Per-session realtime analyzer. Owned by exactly one analysis task;
/// decoded frames are never retained past a cycle.
pub struct RealtimeAnalyzer {
    config: RealtimeAnalyzerConfig,
    indicator_config: IndicatorConfig,
    buffer: FrameBuffer,
    latency_history: VecDeque<f64>,
    degraded_mode: bool,
    last_subject_bbox: Option<BBox>,
    frames_without_subject: u32,
    subject_lost: bool,
}

impl Default for RealtimeAnalyzer {
    fn default() -> Self {
        Self::new(RealtimeAnalyzerConfig::default())
    }
}

impl RealtimeAnalyzer {
    pub fn new(config: RealtimeAnalyzerConfig) -> Self {
        Self {
            indicator_config: IndicatorConfig {
                smoothness_normalization: config.smoothness_normalization,
                ..Default::default()
            },
            buffer: FrameBuffer::new(config.buffer_capacity),
            latency_history: VecDeque::with_capacity(config.latency_history),
            degraded_mode: false,
            last_subject_bbox: None,
            frames_without_subject: 0,
            subject_lost: false,
            config,
        }
    }

    /// Decode one base64-encoded JPEG; `None` on any failure.
    pub fn decode_frame(base64_jpeg: &str) -> Option<RgbImage> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_jpeg.trim())
            .ok()?;
        image::load_from_memory(&bytes).ok().map(|img| img.to_rgb8())
    }

    /// Decode a frame list, silently skipping undecodable entries.
    pub fn decode_frame_buffer(&self, base64_frames: &[String]) -> Vec<RgbImage> {
        base64_frames
            .iter()
            .filter_map(|b64| Self::decode_frame(b64))
            .collect()
    }

    /// Append frames to the sliding buffer with fps-derived timestamps.
    pub fn add_frames(&mut self, frames: Vec<RgbImage>, fps: f64, start_timestamp_s: f64) {
        let interval = if fps > 0.0 { 1.0 / fps } else { 1.0 / 30.0 };
        for (i, frame) in frames.into_iter().enumerate() {
            let frame = self.resize_if_needed(frame);
            self.buffer.push(frame, start_timestamp_s + i as f64 * interval);
        }
    }

    pub fn is_buffer_ready(&self) -> bool {
        self.buffer.len() >= self.config.min_ready_frames
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the analyzer is currently in the sparse (degraded) mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded_mode
    }

    fn resize_if_needed(&self, frame: RgbImage) -> RgbImage {
        let (target_w, target_h) = self.config.target_resolution;
        if frame.dimensions() == (target_w, target_h) {
            frame
        } else {
            image::imageops::resize(&frame, target_w, target_h, FilterType::Triangle)
        }
    }

    fn center_crop(gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        let (crop_w, crop_h) = (width / 2, height / 2);
        image::imageops::crop_imm(gray, width / 4, height / 4, crop_w, crop_h).to_image()
    }

    /// Run optical flow with the adaptive algorithm selection and update the
    /// rolling latency history.
    fn compute_flow(&mut self, gray_frames: &[GrayImage]) -> (OpticalFlow, f64) {
        let start = Instant::now();
        let flow = if self.degraded_mode || self.config.use_sparse_flow {
            sparse_flow(gray_frames)
        } else {
            dense_flow(gray_frames)
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if self.latency_history.len() == self.config.latency_history {
            self.latency_history.pop_front();
        }
        self.latency_history.push_back(latency_ms);
        self.check_degradation();

        (flow, latency_ms)
    }

    fn check_degradation(&mut self) {
        if self.latency_history.len() < 2 {
            return;
        }
        let avg = self.latency_history.iter().sum::<f64>() / self.latency_history.len() as f64;

        if avg > self.config.latency_threshold_ms {
            if !self.degraded_mode {
                debug!(avg_latency_ms = avg, "switching to sparse flow");
                self.degraded_mode = true;
            }
        } else if avg < self.config.latency_threshold_ms * 0.5 && self.degraded_mode {
            debug!(avg_latency_ms = avg, "recovering to dense flow");
            self.degraded_mode = false;
        }
    }

    fn speed_variance(flow: &OpticalFlow) -> f64 {
        if flow.flow_vectors.len() < 2 {
            return 0.0;
        }
        let magnitudes: Vec<f64> = flow
            .flow_vectors
            .iter()
            .map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
            .collect();
        let mean = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
        magnitudes.iter().map(|m| (m - mean) * (m - mean)).sum::<f64>() / magnitudes.len() as f64
    }

    /// Placeholder subject detector: edge-density over a center-weighted 3x3
    /// grid. A model-backed detector can replace this one function without
    /// touching the tracking contract.
    pub fn detect_subject(&self, gray: &GrayImage) -> Option<BBox> {
        let (width, height) = gray.dimensions();
        if width < 6 || height < 6 {
            return None;
        }

        let (cell_w, cell_h) = (width / 3, height / 3);
        let mut best_cell = (1u32, 1u32);
        let mut best_density = 0.0f64;

        for row in 0..3u32 {
            for col in 0..3u32 {
                let x0 = col * cell_w;
                let y0 = row * cell_h;
                let mut edge_pixels = 0u32;
                for y in y0.max(1)..(y0 + cell_h).min(height - 1) {
                    for x in x0.max(1)..(x0 + cell_w).min(width - 1) {
                        let gx = gray.get_pixel(x + 1, y).0[0] as i32
                            - gray.get_pixel(x - 1, y).0[0] as i32;
                        let gy = gray.get_pixel(x, y + 1).0[0] as i32
                            - gray.get_pixel(x, y - 1).0[0] as i32;
                        if gx * gx + gy * gy > 6400 {
                            edge_pixels += 1;
                        }
                    }
                }
                // Density on the 0-255 scale of a binary edge map.
                let density = edge_pixels as f64 * 255.0 / (cell_w * cell_h) as f64;
                let center_weight = 1.0
                    + 0.5
                        * (1.0 - (row as f64 - 1.0).abs() / 1.5)
                        * (1.0 - (col as f64 - 1.0).abs() / 1.5);
                let weighted = density * center_weight;
                if weighted > best_density {
                    best_density = weighted;
                    best_cell = (row, col);
                }
            }
        }

        if best_density < 10.0 {
            return None;
        }

        let (row, col) = best_cell;
        Some(BBox::new(
            (col * cell_w) as f64 / width as f64,
            (row * cell_h) as f64 / height as f64,
            cell_w as f64 / width as f64,
            cell_h as f64 / height as f64,
        ))
    }

    /// Update the subject-lost counter from the latest frame; occupancy
    /// falls back to the last known bbox while the subject is missing.
    fn update_subject_tracking(&mut self, latest_gray: &GrayImage) -> (Option<BBox>, f64, bool) {
        let detected = self.detect_subject(latest_gray);

        match detected {
            Some(bbox) => {
                self.last_subject_bbox = Some(bbox);
                self.frames_without_subject = 0;
                self.subject_lost = false;
                (Some(bbox), bbox.area(), false)
            }
            None => {
                self.frames_without_subject += 1;
                if self.frames_without_subject >= self.config.subject_lost_threshold_frames {
                    self.subject_lost = true;
                }
                let occupancy = self.last_subject_bbox.map(|b| b.area()).unwrap_or(0.0);
                (None, occupancy, self.subject_lost)
            }
        }
    }

    fn confidence(&self, frame_count: usize, flow_vector_count: usize, has_subject: bool) -> f64 {
        let frame_conf = if frame_count < self.config.min_ready_frames {
            frame_count as f64 / self.config.min_ready_frames as f64
        } else if frame_count <= self.config.buffer_capacity {
            1.0
        } else {
            0.9
        };

        let flow_conf = if flow_vector_count < 2 {
            0.3
        } else if flow_vector_count < 5 {
            0.7
        } else {
            1.0
        };

        let subject_conf = if has_subject { 1.0 } else { 0.8 };

        (frame_conf * 0.4 + flow_conf * 0.4 + subject_conf * 0.2).clamp(0.0, 1.0)
    }

    /// Analyze a frame list and produce one result. The main entry point.
    pub fn analyze(&mut self, frames: &[RgbImage]) -> RealtimeAnalysisResult {
        let start = Instant::now();

        if frames.len() < self.config.min_ready_frames {
            return RealtimeAnalysisResult::insufficient(now_ms());
        }

        let resized: Vec<RgbImage> = frames
            .iter()
            .map(|f| self.resize_if_needed(f.clone()))
            .collect();
        let gray_frames: Vec<GrayImage> = resized
            .iter()
            .map(|f| image::imageops::grayscale(f))
            .collect();

        let flow_input: Vec<GrayImage> = if self.config.center_region_only {
            gray_frames.iter().map(Self::center_crop).collect()
        } else {
            gray_frames.clone()
        };

        let (flow, _flow_latency_ms) = self.compute_flow(&flow_input);

        let smoothness = motion_smoothness(&flow, &self.indicator_config);
        let speed_variance = Self::speed_variance(&flow);

        let latest_gray = gray_frames.last().expect("non-empty by min_ready check");
        let (subject_bbox, subject_occupancy, subject_lost) =
            self.update_subject_tracking(latest_gray);

        let latest_frame = resized.last().expect("non-empty by min_ready check");
        let environment = environment_features(latest_frame, latest_gray);

        let confidence =
            self.confidence(frames.len(), flow.flow_vectors.len(), subject_bbox.is_some());

        let analysis_latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        crate::metrics::record_analysis_cycle(analysis_latency_ms);

        RealtimeAnalysisResult {
            avg_speed_px_frame: flow.avg_magnitude,
            speed_variance,
            motion_smoothness: smoothness,
            primary_direction_deg: flow.primary_direction_deg,
            subject_bbox,
            subject_occupancy,
            subject_lost,
            brightness: environment.brightness,
            contrast: environment.contrast,
            sharpness: environment.sharpness,
            saturation: environment.saturation,
            dominant_light: environment.dominant_light,
            composition_score: environment.composition_score,
            analysis_latency_ms,
            confidence,
            timestamp_ms: now_ms(),
        }
    }

    /// Decode, buffer and analyze one inbound frame-buffer message.
    pub fn analyze_encoded(&mut self, base64_frames: &[String], fps: f64) -> (usize, RealtimeAnalysisResult) {
        let decoded = self.decode_frame_buffer(base64_frames);
        let count = decoded.len();
        let start_ts = now_ms() as f64 / 1000.0;
        self.add_frames(decoded, fps, start_ts);

        let frames: Vec<RgbImage> = self.buffer.frames().cloned().collect();
        let result = self.analyze(&frames);
        (count, result)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.latency_history.clear();
        self.degraded_mode = false;
        self.last_subject_bbox = None;
        self.frames_without_subject = 0;
        self.subject_lost = false;
    }
}

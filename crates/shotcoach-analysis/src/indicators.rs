//! Indicator kernel: pure, stateless functions over flow and bbox data.
//!
//! All functions are deterministic and referentially transparent; missing or
//! degenerate inputs map to neutral defaults instead of errors.

use shotcoach_models::{BBox, FeatureOutput, HeuristicIndicators, OpticalFlow};

use crate::error::{AnalysisError, AnalysisResult};

/// Configuration for the indicator kernel.
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    /// Time window for beat alignment scoring (seconds).
    pub beat_alignment_window_s: f64,
    /// Normalization constant for acceleration variance in smoothness.
    pub smoothness_normalization: f64,
    /// Multiplier over mean magnitude marking a motion event.
    pub motion_event_factor: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            beat_alignment_window_s: 0.1,
            smoothness_normalization: 100.0,
            motion_event_factor: 1.5,
        }
    }
}

/// Average motion speed, clamped non-negative.
pub fn avg_motion(flow: &OpticalFlow) -> f64 {
    flow.avg_magnitude.max(0.0)
}

/// Subject area change ratio over consecutive bbox pairs, scaled so a 50%
/// per-frame area change saturates at 1.0.
pub fn frame_pct_change(bboxes: &[BBox]) -> f64 {
    if bboxes.len() < 2 {
        return 0.0;
    }

    let areas: Vec<f64> = bboxes.iter().map(BBox::area).collect();
    let mut changes = Vec::with_capacity(areas.len() - 1);
    for pair in areas.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if prev > 0.0 {
            changes.push((curr - prev).abs() / prev);
        } else if curr > 0.0 {
            // Subject appeared from nothing: count as a full change.
            changes.push(1.0);
        }
    }

    if changes.is_empty() {
        return 0.0;
    }

    let avg_change = changes.iter().sum::<f64>() / changes.len() as f64;
    (avg_change / 0.5).clamp(0.0, 1.0)
}

/// Motion smoothness from the variance of successive magnitude deltas
/// (an acceleration proxy): `exp(-variance / K)`.
pub fn motion_smoothness(flow: &OpticalFlow, config: &IndicatorConfig) -> f64 {
    let magnitudes: Vec<f64> = flow
        .flow_vectors
        .iter()
        .map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
        .collect();

    if magnitudes.len() < 3 {
        // Not enough data for an acceleration estimate.
        return 0.5;
    }

    let accelerations: Vec<f64> = magnitudes.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = accelerations.iter().sum::<f64>() / accelerations.len() as f64;
    let variance = accelerations
        .iter()
        .map(|a| (a - mean) * (a - mean))
        .sum::<f64>()
        / accelerations.len() as f64;

    (-variance / config.smoothness_normalization).exp().clamp(0.0, 1.0)
}

/// Average subject area ratio.
pub fn subject_occupancy(bboxes: &[BBox]) -> f64 {
    if bboxes.is_empty() {
        return 0.0;
    }
    let avg = bboxes.iter().map(BBox::area).sum::<f64>() / bboxes.len() as f64;
    avg.clamp(0.0, 1.0)
}

/// Motion-beat synchronization: for each motion event, the nearest beat
/// contributes `max(0, 1 - delta/window)`. Either list empty yields the
/// neutral score 0.5.
pub fn beat_alignment(motion_times: &[f64], beat_times: &[f64], config: &IndicatorConfig) -> f64 {
    if motion_times.is_empty() || beat_times.is_empty() {
        return 0.5;
    }

    let window = config.beat_alignment_window_s;
    let total: f64 = motion_times
        .iter()
        .map(|&motion_time| {
            let min_distance = beat_times
                .iter()
                .map(|&beat| (motion_time - beat).abs())
                .fold(f64::INFINITY, f64::min);
            if min_distance <= window {
                1.0 - min_distance / window
            } else {
                0.0
            }
        })
        .sum();

    (total / motion_times.len() as f64).clamp(0.0, 1.0)
}

/// Timestamps of significant motion events: flow magnitudes above
/// `factor x mean`, mapped onto frame timestamps by stride.
pub fn extract_motion_timestamps(
    flow: &OpticalFlow,
    timestamps: &[f64],
    config: &IndicatorConfig,
) -> Vec<f64> {
    if flow.flow_vectors.len() < 2 || timestamps.is_empty() {
        return Vec::new();
    }

    let magnitudes: Vec<f64> = flow
        .flow_vectors
        .iter()
        .map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
        .collect();
    let mean = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    let threshold = mean * config.motion_event_factor;

    let step = (timestamps.len() / magnitudes.len()).max(1);
    magnitudes
        .iter()
        .enumerate()
        .filter(|(_, &mag)| mag > threshold)
        .map(|(i, _)| timestamps[(i * step).min(timestamps.len() - 1)])
        .collect()
}

/// Compute the full indicator record for a feature output over a time range.
pub fn compute_indicators(
    features: &FeatureOutput,
    time_range: (f64, f64),
    config: &IndicatorConfig,
) -> AnalysisResult<HeuristicIndicators> {
    if time_range.0 < 0.0 || time_range.0 >= time_range.1 {
        return Err(AnalysisError::invalid_input(format!(
            "time_range ({}, {}) must satisfy 0 <= start < end",
            time_range.0, time_range.1
        )));
    }

    let bboxes = &features.subject_tracking.bboxes;
    let motion_times = extract_motion_timestamps(
        &features.optical_flow,
        &features.subject_tracking.timestamps_s,
        config,
    );
    let beats = features.audio_beats.as_deref().unwrap_or(&[]);

    let indicators = HeuristicIndicators {
        video_id: features.video_id.clone(),
        time_range,
        avg_motion_px_per_s: avg_motion(&features.optical_flow),
        frame_pct_change: frame_pct_change(bboxes),
        motion_smoothness: motion_smoothness(&features.optical_flow, config),
        subject_occupancy: subject_occupancy(bboxes),
        beat_alignment: beat_alignment(&motion_times, beats, config),
    };

    if !indicators.is_valid() {
        return Err(AnalysisError::indicator_out_of_domain(format!(
            "avg_motion={}, frame_pct_change={}, motion_smoothness={}, \
             subject_occupancy={}, beat_alignment={}",
            indicators.avg_motion_px_per_s,
            indicators.frame_pct_change,
            indicators.motion_smoothness,
            indicators.subject_occupancy,
            indicators.beat_alignment,
        )));
    }

    Ok(indicators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotcoach_models::SubjectTracking;

    fn flow_with_vectors(vectors: Vec<(f64, f64)>) -> OpticalFlow {
        OpticalFlow {
            avg_magnitude: 10.0,
            primary_direction_deg: 0.0,
            flow_vectors: vectors,
        }
    }

    #[test]
    fn test_avg_motion_clamps_negative() {
        let mut flow = OpticalFlow::still();
        flow.avg_magnitude = -5.0;
        assert_eq!(avg_motion(&flow), 0.0);
    }

    #[test]
    fn test_frame_pct_change_constant_areas() {
        let bboxes = vec![BBox::new(0.2, 0.2, 0.5, 0.4); 5];
        assert_eq!(frame_pct_change(&bboxes), 0.0);
    }

    #[test]
    fn test_frame_pct_change_growing_subject() {
        let bboxes = vec![
            BBox::new(0.4, 0.4, 0.2, 0.2),
            BBox::new(0.35, 0.35, 0.3, 0.3),
            BBox::new(0.3, 0.3, 0.4, 0.4),
        ];
        let change = frame_pct_change(&bboxes);
        assert!(change > 0.0 && change <= 1.0);
    }

    #[test]
    fn test_frame_pct_change_zero_then_nonzero_counts_full() {
        let bboxes = vec![BBox::new(0.0, 0.0, 0.0, 0.0), BBox::new(0.2, 0.2, 0.5, 0.5)];
        // Single full change of 1.0, scaled by 1/0.5, clamped to 1.0.
        assert_eq!(frame_pct_change(&bboxes), 1.0);
    }

    #[test]
    fn test_frame_pct_change_too_few_boxes() {
        assert_eq!(frame_pct_change(&[BBox::new(0.1, 0.1, 0.2, 0.2)]), 0.0);
        assert_eq!(frame_pct_change(&[]), 0.0);
    }

    #[test]
    fn test_motion_smoothness_constant_velocity_is_high() {
        let config = IndicatorConfig::default();
        let flow = flow_with_vectors(vec![(3.0, 4.0); 10]);
        let smoothness = motion_smoothness(&flow, &config);
        assert!(smoothness > 0.99);
    }

    #[test]
    fn test_motion_smoothness_erratic_velocity_is_low() {
        let config = IndicatorConfig::default();
        let vectors: Vec<(f64, f64)> = (0..10)
            .map(|i| if i % 2 == 0 { (40.0, 0.0) } else { (1.0, 0.0) })
            .collect();
        let flow = flow_with_vectors(vectors);
        let smoothness = motion_smoothness(&flow, &config);
        assert!(smoothness < 0.2);
    }

    #[test]
    fn test_motion_smoothness_too_few_vectors_is_neutral() {
        let config = IndicatorConfig::default();
        let flow = flow_with_vectors(vec![(1.0, 0.0), (2.0, 0.0)]);
        assert_eq!(motion_smoothness(&flow, &config), 0.5);
    }

    #[test]
    fn test_subject_occupancy_mean_of_areas() {
        let bboxes = vec![BBox::new(0.0, 0.0, 0.5, 0.5), BBox::new(0.0, 0.0, 0.5, 0.1)];
        let occupancy = subject_occupancy(&bboxes);
        assert!((occupancy - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_beat_alignment_empty_lists_neutral() {
        let config = IndicatorConfig::default();
        assert_eq!(beat_alignment(&[], &[1.0], &config), 0.5);
        assert_eq!(beat_alignment(&[1.0], &[], &config), 0.5);
    }

    #[test]
    fn test_beat_alignment_perfect() {
        let config = IndicatorConfig::default();
        let times = [1.0, 2.0, 3.0];
        assert_eq!(beat_alignment(&times, &times, &config), 1.0);
    }

    #[test]
    fn test_beat_alignment_outside_window_scores_zero() {
        let config = IndicatorConfig::default();
        assert_eq!(beat_alignment(&[1.0], &[2.0], &config), 0.0);
    }

    #[test]
    fn test_extract_motion_timestamps_finds_peaks() {
        let config = IndicatorConfig::default();
        let mut vectors = vec![(1.0, 0.0); 9];
        vectors.push((50.0, 0.0));
        let flow = flow_with_vectors(vectors);
        let timestamps: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let events = extract_motion_timestamps(&flow, &timestamps, &config);
        assert_eq!(events, vec![4.5]);
    }

    #[test]
    fn test_compute_indicators_all_in_domain() {
        let config = IndicatorConfig::default();
        let features = FeatureOutput {
            video_id: "vid-1".to_string(),
            optical_flow: flow_with_vectors(vec![(2.0, 1.0); 8]),
            subject_tracking: SubjectTracking {
                bboxes: vec![BBox::new(0.3, 0.3, 0.4, 0.4); 8],
                confidences: vec![0.9; 8],
                timestamps_s: (0..8).map(|i| i as f64 * 0.5).collect(),
            },
            audio_beats: Some(vec![0.5, 1.0, 1.5]),
        };
        let indicators = compute_indicators(&features, (0.0, 4.0), &config).unwrap();
        assert!(indicators.is_valid());
    }

    #[test]
    fn test_compute_indicators_rejects_bad_time_range() {
        let config = IndicatorConfig::default();
        let features = FeatureOutput {
            video_id: "vid-1".to_string(),
            optical_flow: OpticalFlow::still(),
            subject_tracking: SubjectTracking::default(),
            audio_beats: None,
        };
        assert!(compute_indicators(&features, (2.0, 2.0), &config).is_err());
    }
}

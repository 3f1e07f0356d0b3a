//! Per-indicator smoothing with anomaly detection and suppression.

use std::collections::VecDeque;

/// Configuration for the smoothing filter.
#[derive(Debug, Clone)]
pub struct SmoothingConfig {
    /// Sliding window size (also the anomaly-detection history length).
    pub window_size: usize,
    /// Kalman mode when true, sliding window average otherwise.
    pub use_kalman: bool,
    /// Standard deviations beyond which an input counts as anomalous.
    pub anomaly_threshold: f64,
    /// Cycles to suppress downstream advice after an anomaly.
    pub anomaly_suppress_cycles: u32,
    /// Q: process noise covariance.
    pub process_noise: f64,
    /// R: measurement noise covariance.
    pub measurement_noise: f64,
    /// P0: initial estimate error covariance.
    pub initial_estimate_error: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            use_kalman: true,
            anomaly_threshold: 2.0,
            anomaly_suppress_cycles: 2,
            process_noise: 0.01,
            measurement_noise: 0.1,
            initial_estimate_error: 1.0,
        }
    }
}

/// One cycle's worth of indicator values fed through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSample {
    pub motion_smoothness: f64,
    pub avg_speed: f64,
    pub speed_variance: f64,
    pub primary_direction_deg: f64,
    pub subject_occupancy: f64,
    pub confidence: f64,
}

/// Scalar Kalman state.
#[derive(Debug, Clone, Copy)]
struct KalmanState {
    estimate: f64,
    error_covariance: f64,
}

const CHANNELS: usize = 6;

/// Smoothing filter over the six indicator channels.
///
/// Output variance is bounded by input variance once the filter has warmed
/// up; an anomalous input (beyond `anomaly_threshold` standard deviations of
/// the recent window, on smoothness or speed) starts a suppression countdown
/// during which downstream advice generation is bypassed.
#[derive(Debug)]
pub struct SmoothingFilter {
    config: SmoothingConfig,
    history: VecDeque<IndicatorSample>,
    kalman: [KalmanState; CHANNELS],
    anomaly_countdown: u32,
    initialized: bool,
}

impl Default for SmoothingFilter {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}

impl SmoothingFilter {
    pub fn new(config: SmoothingConfig) -> Self {
        let state = KalmanState {
            estimate: 0.0,
            error_covariance: config.initial_estimate_error,
        };
        Self {
            history: VecDeque::with_capacity(config.window_size),
            kalman: [state; CHANNELS],
            anomaly_countdown: 0,
            initialized: false,
            config,
        }
    }

    /// Whether advice generation should currently be bypassed.
    pub fn is_suppressed(&self) -> bool {
        self.anomaly_countdown > 0
    }

    /// Feed one sample through the filter and get the smoothed values.
    pub fn update(&mut self, sample: IndicatorSample) -> IndicatorSample {
        // Countdown decrements before the new check so a fresh anomaly
        // restarts the full window.
        if self.anomaly_countdown > 0 {
            self.anomaly_countdown -= 1;
        }

        if self.initialized && self.detect_anomaly(&sample) {
            self.anomaly_countdown = self.config.anomaly_suppress_cycles;
        }

        if self.history.len() == self.config.window_size {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        let smoothed = if self.config.use_kalman {
            self.apply_kalman(&sample)
        } else {
            self.apply_sliding_window()
        };

        self.initialized = true;
        smoothed
    }

    fn apply_kalman(&mut self, sample: &IndicatorSample) -> IndicatorSample {
        let measurements = [
            sample.motion_smoothness,
            sample.avg_speed,
            sample.speed_variance,
            sample.primary_direction_deg,
            sample.subject_occupancy,
            sample.confidence,
        ];
        let mut estimates = [0.0; CHANNELS];

        for (i, &z) in measurements.iter().enumerate() {
            let state = &mut self.kalman[i];
            if !self.initialized {
                state.estimate = z;
                state.error_covariance = self.config.initial_estimate_error;
                estimates[i] = z;
            } else {
                let p_pred = state.error_covariance + self.config.process_noise;
                let gain = p_pred / (p_pred + self.config.measurement_noise);
                state.estimate += gain * (z - state.estimate);
                state.error_covariance = (1.0 - gain) * p_pred;
                estimates[i] = state.estimate;
            }
        }

        IndicatorSample {
            motion_smoothness: estimates[0],
            avg_speed: estimates[1],
            speed_variance: estimates[2],
            primary_direction_deg: estimates[3],
            subject_occupancy: estimates[4],
            confidence: estimates[5],
        }
    }

    fn apply_sliding_window(&self) -> IndicatorSample {
        let n = self.history.len() as f64;
        let mut sums = [0.0; 5];
        let (mut sin_sum, mut cos_sum) = (0.0, 0.0);

        for sample in &self.history {
            sums[0] += sample.motion_smoothness;
            sums[1] += sample.avg_speed;
            sums[2] += sample.speed_variance;
            sums[3] += sample.subject_occupancy;
            sums[4] += sample.confidence;
            sin_sum += sample.primary_direction_deg.to_radians().sin();
            cos_sum += sample.primary_direction_deg.to_radians().cos();
        }

        // Circular mean for the angle channel.
        let avg_direction = (sin_sum / n).atan2(cos_sum / n).to_degrees().rem_euclid(360.0);

        IndicatorSample {
            motion_smoothness: sums[0] / n,
            avg_speed: sums[1] / n,
            speed_variance: sums[2] / n,
            primary_direction_deg: avg_direction,
            subject_occupancy: sums[3] / n,
            confidence: sums[4] / n,
        }
    }

    /// Detect sudden deviations (lighting change, dropped frames) against the
    /// recent window. Checks smoothness and speed, the two channels most
    /// sensitive to scene disruption.
    fn detect_anomaly(&self, sample: &IndicatorSample) -> bool {
        if self.history.len() < 2 {
            return false;
        }

        let deviates = |values: Vec<f64>, current: f64| {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / (values.len() - 1) as f64;
            let std = if variance > 0.0 { variance.sqrt() } else { 0.001 };
            (current - mean).abs() > self.config.anomaly_threshold * std
        };

        let smoothness_values: Vec<f64> =
            self.history.iter().map(|h| h.motion_smoothness).collect();
        let speed_values: Vec<f64> = self.history.iter().map(|h| h.avg_speed).collect();

        deviates(smoothness_values, sample.motion_smoothness)
            || deviates(speed_values, sample.avg_speed)
    }

    /// Output/input variance ratio on the smoothness channel, `None` until
    /// enough history has accumulated.
    pub fn variance_reduction(&self) -> Option<f64> {
        if self.history.len() < 3 {
            return None;
        }

        let values: Vec<f64> = self.history.iter().map(|h| h.motion_smoothness).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let input_variance =
            values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;

        if input_variance == 0.0 {
            return Some(1.0);
        }

        let output_variance = if self.config.use_kalman {
            self.kalman[0].error_covariance
        } else {
            input_variance / self.history.len() as f64
        };

        Some(output_variance / input_variance)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.anomaly_countdown = 0;
        self.initialized = false;
        for state in &mut self.kalman {
            state.estimate = 0.0;
            state.error_covariance = self.config.initial_estimate_error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(smoothness: f64, speed: f64) -> IndicatorSample {
        IndicatorSample {
            motion_smoothness: smoothness,
            avg_speed: speed,
            speed_variance: 1.0,
            primary_direction_deg: 90.0,
            subject_occupancy: 0.3,
            confidence: 0.8,
        }
    }

    fn variance(values: &[f64]) -> f64 {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_first_sample_passes_through_kalman() {
        let mut filter = SmoothingFilter::default();
        let smoothed = filter.update(sample(0.7, 10.0));
        assert!((smoothed.motion_smoothness - 0.7).abs() < 1e-9);
        assert!((smoothed.avg_speed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_kalman_reduces_variance_of_noisy_sequence() {
        let mut filter = SmoothingFilter::default();
        let inputs: Vec<f64> = (0..20)
            .map(|i| 0.6 + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let outputs: Vec<f64> = inputs
            .iter()
            .map(|&s| filter.update(sample(s, 10.0)).motion_smoothness)
            .collect();
        // Exclude the warm-up region.
        assert!(variance(&outputs[5..]) <= variance(&inputs[5..]));
    }

    #[test]
    fn test_sliding_window_reduces_variance() {
        let config = SmoothingConfig {
            use_kalman: false,
            ..Default::default()
        };
        let mut filter = SmoothingFilter::new(config);
        let inputs: Vec<f64> = (0..12)
            .map(|i| 0.5 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let outputs: Vec<f64> = inputs
            .iter()
            .map(|&s| filter.update(sample(s, 10.0)).motion_smoothness)
            .collect();
        assert!(variance(&outputs[3..]) <= variance(&inputs[3..]));
    }

    #[test]
    fn test_circular_direction_average_across_wraparound() {
        let config = SmoothingConfig {
            use_kalman: false,
            window_size: 2,
            // Large threshold so the identical speeds don't trip anomaly logic.
            anomaly_threshold: 100.0,
            ..Default::default()
        };
        let mut filter = SmoothingFilter::new(config);
        let mut s1 = sample(0.7, 10.0);
        s1.primary_direction_deg = 350.0;
        let mut s2 = sample(0.7, 10.0);
        s2.primary_direction_deg = 10.0;
        filter.update(s1);
        let smoothed = filter.update(s2);
        // Naive averaging would give 180; circular averaging gives ~0.
        assert!(smoothed.primary_direction_deg < 5.0 || smoothed.primary_direction_deg > 355.0);
    }

    #[test]
    fn test_anomaly_triggers_suppression_window() {
        let mut filter = SmoothingFilter::default();
        for _ in 0..3 {
            filter.update(sample(0.7, 10.0));
        }
        assert!(!filter.is_suppressed());

        // A wild jump in speed should trip the detector.
        filter.update(sample(0.7, 500.0));
        assert!(filter.is_suppressed());

        // Suppression lasts for the configured number of cycles.
        filter.update(sample(0.7, 500.0));
        filter.update(sample(0.7, 500.0));
        filter.update(sample(0.7, 500.0));
        assert!(!filter.is_suppressed());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = SmoothingFilter::default();
        for _ in 0..3 {
            filter.update(sample(0.7, 10.0));
        }
        filter.update(sample(0.7, 500.0));
        filter.reset();
        assert!(!filter.is_suppressed());
        let smoothed = filter.update(sample(0.2, 1.0));
        assert!((smoothed.motion_smoothness - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_variance_reduction_reported_after_warmup() {
        let mut filter = SmoothingFilter::default();
        assert!(filter.variance_reduction().is_none());
        for i in 0..5 {
            filter.update(sample(0.5 + 0.01 * i as f64, 10.0));
        }
        let ratio = filter.variance_reduction().unwrap();
        assert!(ratio >= 0.0);
    }
}

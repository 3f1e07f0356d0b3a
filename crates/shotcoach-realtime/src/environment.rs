//! Environment features computed from the most recent frame.

use image::{GrayImage, RgbImage};

use shotcoach_models::DominantLight;

/// Per-frame environment measurements, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentFeatures {
    pub brightness: f64,
    pub contrast: f64,
    pub sharpness: f64,
    pub saturation: f64,
    pub dominant_light: DominantLight,
    pub composition_score: f64,
}

impl Default for EnvironmentFeatures {
    fn default() -> Self {
        Self {
            brightness: 0.5,
            contrast: 0.5,
            sharpness: 0.5,
            saturation: 0.5,
            dominant_light: DominantLight::Neutral,
            composition_score: 0.5,
        }
    }
}

/// Compute all environment features for one frame.
pub fn environment_features(frame: &RgbImage, gray: &GrayImage) -> EnvironmentFeatures {
    EnvironmentFeatures {
        brightness: brightness(frame),
        contrast: contrast(gray),
        sharpness: sharpness(gray),
        saturation: saturation(frame),
        dominant_light: dominant_light(frame),
        composition_score: composition_score(gray),
    }
}

/// Mean CIE L* over the frame, normalized to `[0, 1]`.
pub fn brightness(frame: &RgbImage) -> f64 {
    let mut sum = 0.0;
    for pixel in frame.pixels() {
        let [r, g, b] = pixel.0;
        sum += cie_lightness(r, g, b);
    }
    (sum / frame.pixels().len().max(1) as f64 / 100.0).clamp(0.0, 1.0)
}

/// CIE L* (0-100) from sRGB bytes.
fn cie_lightness(r: u8, g: u8, b: u8) -> f64 {
    let linear = |c: u8| {
        let c = c as f64 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    let y = 0.2126 * linear(r) + 0.7152 * linear(g) + 0.0722 * linear(b);
    if y > 0.008856 {
        116.0 * y.cbrt() - 16.0
    } else {
        903.3 * y
    }
}

/// Grayscale coefficient of variation, doubled and clamped to `[0, 1]`.
pub fn contrast(gray: &GrayImage) -> f64 {
    let n = gray.pixels().len() as f64;
    if n == 0.0 {
        return 0.5;
    }
    let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    let variance = gray
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / (mean + 1e-6);
    (cv * 2.0).clamp(0.0, 1.0)
}

/// Variance of the 4-neighbor Laplacian, normalized by 500 and clamped.
pub fn sharpness(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.5;
    }

    let mut values = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y).0[0] as f64;
            let neighbors = gray.get_pixel(x - 1, y).0[0] as f64
                + gray.get_pixel(x + 1, y).0[0] as f64
                + gray.get_pixel(x, y - 1).0[0] as f64
                + gray.get_pixel(x, y + 1).0[0] as f64;
            values.push(neighbors - 4.0 * center);
        }
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (variance / 500.0).clamp(0.0, 1.0)
}

/// Mean HSV saturation: `(max - min) / max` per pixel.
pub fn saturation(frame: &RgbImage) -> f64 {
    let n = frame.pixels().len() as f64;
    if n == 0.0 {
        return 0.5;
    }
    let sum: f64 = frame
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            let max = r.max(g).max(b) as f64;
            let min = r.min(g).min(b) as f64;
            if max > 0.0 {
                (max - min) / max
            } else {
                0.0
            }
        })
        .sum();
    (sum / n).clamp(0.0, 1.0)
}

/// Warm/cool/neutral classification from the channel-ratio heuristic
/// `(r + 0.5g) / (b + 0.5g)`. A gray frame sits at exactly 1.0.
pub fn dominant_light(frame: &RgbImage) -> DominantLight {
    let n = frame.pixels().len() as f64;
    if n == 0.0 {
        return DominantLight::Neutral;
    }

    let (mut r_sum, mut g_sum, mut b_sum) = (0.0, 0.0, 0.0);
    for pixel in frame.pixels() {
        r_sum += pixel.0[0] as f64;
        g_sum += pixel.0[1] as f64;
        b_sum += pixel.0[2] as f64;
    }

    let ratio = (r_sum / n + 0.5 * g_sum / n) / (b_sum / n + 0.5 * g_sum / n + 1e-6);
    if ratio > 1.3 {
        DominantLight::Warm
    } else if ratio < 0.8 {
        DominantLight::Cool
    } else {
        DominantLight::Neutral
    }
}

/// Composition score: mean 32-bin histogram entropy in windows around the
/// rule-of-thirds points, normalized by 4 bits and clamped.
pub fn composition_score(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let third_w = width / 3;
    let third_h = height / 3;
    let window = 32.min(third_h / 2).min(third_w / 2);
    if window == 0 {
        return 0.5;
    }

    let points = [
        (third_w, third_h),
        (2 * third_w, third_h),
        (third_w, 2 * third_h),
        (2 * third_w, 2 * third_h),
    ];

    let mut entropies = Vec::with_capacity(4);
    for (cx, cy) in points {
        if cx < window || cy < window || cx + window >= width || cy + window >= height {
            continue;
        }
        let mut histogram = [0u32; 32];
        let mut total = 0u32;
        for y in cy - window..cy + window {
            for x in cx - window..cx + window {
                histogram[(gray.get_pixel(x, y).0[0] / 8) as usize] += 1;
                total += 1;
            }
        }
        let entropy: f64 = histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total as f64;
                -p * p.log2()
            })
            .sum();
        entropies.push(entropy);
    }

    if entropies.is_empty() {
        return 0.5;
    }
    let mean = entropies.iter().sum::<f64>() / entropies.len() as f64;
    (mean / 4.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn uniform_rgb(r: u8, g: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(96, 96, Rgb([r, g, b]))
    }

    fn uniform_gray(value: u8) -> GrayImage {
        GrayImage::from_pixel(96, 96, Luma([value]))
    }

    #[test]
    fn test_brightness_extremes() {
        assert!(brightness(&uniform_rgb(255, 255, 255)) > 0.95);
        assert!(brightness(&uniform_rgb(0, 0, 0)) < 0.05);
    }

    #[test]
    fn test_contrast_of_flat_frame_is_zero() {
        assert_eq!(contrast(&uniform_gray(128)), 0.0);
    }

    #[test]
    fn test_contrast_of_checkerboard_is_high() {
        let gray = GrayImage::from_fn(96, 96, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        assert!(contrast(&gray) > 0.9);
    }

    #[test]
    fn test_sharpness_flat_vs_textured() {
        assert_eq!(sharpness(&uniform_gray(100)), 0.0);
        let textured = GrayImage::from_fn(96, 96, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        assert!(sharpness(&textured) > 0.5);
    }

    #[test]
    fn test_saturation_gray_vs_pure_color() {
        assert_eq!(saturation(&uniform_rgb(128, 128, 128)), 0.0);
        assert!(saturation(&uniform_rgb(255, 0, 0)) > 0.99);
    }

    #[test]
    fn test_dominant_light_classification() {
        assert_eq!(dominant_light(&uniform_rgb(220, 160, 80)), DominantLight::Warm);
        assert_eq!(dominant_light(&uniform_rgb(60, 100, 230)), DominantLight::Cool);
        assert_eq!(
            dominant_light(&uniform_rgb(128, 128, 128)),
            DominantLight::Neutral
        );
    }

    #[test]
    fn test_composition_score_bounds() {
        let flat = composition_score(&uniform_gray(128));
        assert!((0.0..=1.0).contains(&flat));
        let textured = GrayImage::from_fn(192, 144, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));
        let score = composition_score(&textured);
        assert!(score > flat);
        assert!(score <= 1.0);
    }
}

//! Optical-flow estimation over grayscale frame buffers.
//!
//! Two modes with the same summary contract: a dense block-matching field
//! (default, more accurate) and a sparse corner tracker (faster, used under
//! latency pressure). Both report per-pair mean magnitudes, a
//! magnitude-weighted dominant angle, and one sampled vector per frame pair.

use image::GrayImage;

use shotcoach_models::OpticalFlow;

/// Block size for the dense field.
const DENSE_BLOCK: u32 = 16;
/// Search radius in pixels for block matching.
const SEARCH_RADIUS: i32 = 7;
/// Patch half-size for sparse corner tracking.
const SPARSE_PATCH: u32 = 4;
/// Corners tracked per frame pair in sparse mode.
const SPARSE_MAX_CORNERS: usize = 48;
/// Minimum gradient response for a corner candidate.
const SPARSE_MIN_RESPONSE: u32 = 1200;

/// Dense flow: per-block displacement field over consecutive frame pairs.
pub fn dense_flow(frames: &[GrayImage]) -> OpticalFlow {
    flow_over_pairs(frames, pair_flow_dense)
}

/// Sparse flow: tracked high-gradient corners over consecutive frame pairs.
pub fn sparse_flow(frames: &[GrayImage]) -> OpticalFlow {
    flow_over_pairs(frames, pair_flow_sparse)
}

/// One frame pair's worth of displacement vectors.
type PairVectors = Vec<(f64, f64)>;

fn flow_over_pairs(
    frames: &[GrayImage],
    pair_flow: fn(&GrayImage, &GrayImage) -> PairVectors,
) -> OpticalFlow {
    if frames.len() < 2 {
        return OpticalFlow::still();
    }

    let mut pair_magnitudes = Vec::with_capacity(frames.len() - 1);
    let mut pair_angles = Vec::with_capacity(frames.len() - 1);
    let mut sampled_vectors = Vec::with_capacity(frames.len() - 1);

    for pair in frames.windows(2) {
        let vectors = pair_flow(&pair[0], &pair[1]);
        if vectors.is_empty() {
            continue;
        }

        let magnitudes: Vec<f64> = vectors
            .iter()
            .map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
            .collect();
        let mean_magnitude = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
        pair_magnitudes.push(mean_magnitude);
        pair_angles.push(weighted_circular_mean(&vectors, &magnitudes));

        // Sample the middle vector as this pair's representative.
        sampled_vectors.push(vectors[vectors.len() / 2]);
    }

    if pair_magnitudes.is_empty() {
        return OpticalFlow::still();
    }

    let avg_magnitude = pair_magnitudes.iter().sum::<f64>() / pair_magnitudes.len() as f64;
    let primary_direction_deg = circular_mean_weighted(&pair_angles, &pair_magnitudes);

    OpticalFlow {
        avg_magnitude,
        primary_direction_deg,
        flow_vectors: sampled_vectors,
    }
}

/// Magnitude-weighted circular mean of vector angles, degrees `[0, 360)`.
fn weighted_circular_mean(vectors: &[(f64, f64)], magnitudes: &[f64]) -> f64 {
    let total: f64 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
    for ((vx, vy), &mag) in vectors.iter().zip(magnitudes) {
        let angle = vy.atan2(*vx);
        sin_sum += angle.sin() * mag;
        cos_sum += angle.cos() * mag;
    }
    sin_sum.atan2(cos_sum).to_degrees().rem_euclid(360.0)
}

/// Circular mean of angles (degrees), weighted per element.
fn circular_mean_weighted(angles_deg: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
    for (&angle, &weight) in angles_deg.iter().zip(weights) {
        let radians = angle.to_radians();
        sin_sum += radians.sin() * weight;
        cos_sum += radians.cos() * weight;
    }
    sin_sum.atan2(cos_sum).to_degrees().rem_euclid(360.0)
}

/// Sum of absolute differences between a patch in `prev` at (x, y) and the
/// same-size patch in `next` at (x+dx, y+dy), bailing out once `bound` is
/// exceeded. Caller guarantees bounds.
fn patch_sad(
    prev: &GrayImage,
    next: &GrayImage,
    x: u32,
    y: u32,
    dx: i32,
    dy: i32,
    size: u32,
    bound: u64,
) -> u64 {
    let mut sad = 0u64;
    for row in 0..size {
        for col in 0..size {
            let p = prev.get_pixel(x + col, y + row).0[0] as i64;
            let nx = (x + col) as i32 + dx;
            let ny = (y + row) as i32 + dy;
            let n = next.get_pixel(nx as u32, ny as u32).0[0] as i64;
            sad += (p - n).unsigned_abs();
        }
        if sad > bound {
            return sad;
        }
    }
    sad
}

/// Best displacement for a patch via exhaustive search in the radius.
/// Zero displacement wins ties, so textureless regions report no motion.
fn best_displacement(
    prev: &GrayImage,
    next: &GrayImage,
    x: u32,
    y: u32,
    size: u32,
) -> (f64, f64) {
    let (width, height) = prev.dimensions();
    let mut best = (0i32, 0i32);
    let mut best_sad = patch_sad(prev, next, x, y, 0, 0, size, u64::MAX);

    for dy in -SEARCH_RADIUS..=SEARCH_RADIUS {
        for dx in -SEARCH_RADIUS..=SEARCH_RADIUS {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0
                || ny < 0
                || nx as u32 + size > width
                || ny as u32 + size > height
            {
                continue;
            }
            let sad = patch_sad(prev, next, x, y, dx, dy, size, best_sad);
            if sad < best_sad {
                best_sad = sad;
                best = (dx, dy);
            }
        }
    }

    (best.0 as f64, best.1 as f64)
}

fn pair_flow_dense(prev: &GrayImage, next: &GrayImage) -> PairVectors {
    let (width, height) = prev.dimensions();
    if width < DENSE_BLOCK || height < DENSE_BLOCK {
        return Vec::new();
    }

    let margin = SEARCH_RADIUS as u32;
    let mut vectors = Vec::new();
    let mut y = margin;
    while y + DENSE_BLOCK + margin <= height {
        let mut x = margin;
        while x + DENSE_BLOCK + margin <= width {
            vectors.push(best_displacement(prev, next, x, y, DENSE_BLOCK));
            x += DENSE_BLOCK;
        }
        y += DENSE_BLOCK;
    }
    vectors
}

/// Gradient response via central differences; high values mark corners.
fn gradient_response(frame: &GrayImage, x: u32, y: u32) -> u32 {
    let left = frame.get_pixel(x - 1, y).0[0] as i32;
    let right = frame.get_pixel(x + 1, y).0[0] as i32;
    let up = frame.get_pixel(x, y - 1).0[0] as i32;
    let down = frame.get_pixel(x, y + 1).0[0] as i32;
    let gx = right - left;
    let gy = down - up;
    (gx * gx + gy * gy) as u32
}

/// Pick strong, spread-out corner candidates on a coarse grid.
fn find_corners(frame: &GrayImage) -> Vec<(u32, u32)> {
    let (width, height) = frame.dimensions();
    let margin = SEARCH_RADIUS as u32 + SPARSE_PATCH + 1;
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }

    let cells = 8u32;
    let cell_w = (width - 2 * margin) / cells;
    let cell_h = (height - 2 * margin) / cells;
    if cell_w == 0 || cell_h == 0 {
        return Vec::new();
    }

    let mut corners = Vec::new();
    for cy in 0..cells {
        for cx in 0..cells {
            let x0 = margin + cx * cell_w;
            let y0 = margin + cy * cell_h;
            let mut best = None;
            let mut best_response = SPARSE_MIN_RESPONSE;
            // Sample every other pixel within the cell.
            let mut y = y0;
            while y < y0 + cell_h {
                let mut x = x0;
                while x < x0 + cell_w {
                    let response = gradient_response(frame, x, y);
                    if response > best_response {
                        best_response = response;
                        best = Some((x, y));
                    }
                    x += 2;
                }
                y += 2;
            }
            if let Some(corner) = best {
                corners.push(corner);
                if corners.len() >= SPARSE_MAX_CORNERS {
                    return corners;
                }
            }
        }
    }
    corners
}

fn pair_flow_sparse(prev: &GrayImage, next: &GrayImage) -> PairVectors {
    find_corners(prev)
        .into_iter()
        .map(|(x, y)| {
            best_displacement(
                prev,
                next,
                x - SPARSE_PATCH,
                y - SPARSE_PATCH,
                SPARSE_PATCH * 2,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame with a bright square at (x, y) on a dark background.
    fn frame_with_square(x: u32, y: u32) -> GrayImage {
        GrayImage::from_fn(160, 120, |px, py| {
            if px >= x && px < x + 24 && py >= y && py < y + 24 {
                image::Luma([220u8])
            } else {
                image::Luma([20u8])
            }
        })
    }

    #[test]
    fn test_too_few_frames_is_still() {
        let flow = dense_flow(&[frame_with_square(40, 40)]);
        assert_eq!(flow.avg_magnitude, 0.0);
        assert!(flow.flow_vectors.is_empty());
    }

    #[test]
    fn test_static_scene_has_near_zero_flow() {
        let frames = vec![frame_with_square(40, 40), frame_with_square(40, 40)];
        let flow = dense_flow(&frames);
        assert!(flow.avg_magnitude < 0.5, "magnitude {}", flow.avg_magnitude);
    }

    #[test]
    fn test_rightward_motion_detected_dense() {
        let frames = vec![
            frame_with_square(40, 40),
            frame_with_square(45, 40),
            frame_with_square(50, 40),
        ];
        let flow = dense_flow(&frames);
        assert!(flow.avg_magnitude > 0.1);
        // Rightward screen motion is around 0 degrees.
        assert!(
            flow.primary_direction_deg < 45.0 || flow.primary_direction_deg > 315.0,
            "direction {}",
            flow.primary_direction_deg
        );
        assert_eq!(flow.flow_vectors.len(), 2);
    }

    #[test]
    fn test_downward_motion_detected_sparse() {
        let frames = vec![
            frame_with_square(60, 30),
            frame_with_square(60, 35),
            frame_with_square(60, 40),
        ];
        let flow = sparse_flow(&frames);
        assert!(flow.avg_magnitude > 0.1);
        assert!(
            (flow.primary_direction_deg - 90.0).abs() < 45.0,
            "direction {}",
            flow.primary_direction_deg
        );
    }

    #[test]
    fn test_weighted_circular_mean_wraps() {
        let vectors = vec![(1.0, -0.05), (1.0, 0.05)];
        let magnitudes = vec![1.0, 1.0];
        let mean = weighted_circular_mean(&vectors, &magnitudes);
        assert!(mean < 10.0 || mean > 350.0);
    }
}

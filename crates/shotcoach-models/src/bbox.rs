use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A normalized bounding box (0.0 to 1.0) for a subject region within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    /// X coordinate of the top-left corner (0.0 = left, 1.0 = right)
    pub x: f64,
    /// Y coordinate of the top-left corner (0.0 = top, 1.0 = bottom)
    pub y: f64,
    /// Width of the box (0.0 to 1.0)
    pub w: f64,
    /// Height of the box (0.0 to 1.0)
    pub h: f64,
}

impl BBox {
    /// Create a new normalized bounding box.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Area of the box. For valid boxes this is the fraction of the frame covered.
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Center point of the box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Check whether the box lies within the unit square.
    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.w >= 0.0
            && self.h >= 0.0
            && self.x + self.w <= 1.001 // Allow small epsilon for float precision
            && self.y + self.h <= 1.001
    }

    /// Return a clamped copy that is guaranteed valid.
    pub fn normalize(&self) -> Self {
        let x = self.x.clamp(0.0, 1.0);
        let y = self.y.clamp(0.0, 1.0);
        let w = self.w.clamp(0.0, 1.0 - x);
        let h = self.h.clamp(0.0, 1.0 - y);
        Self { x, y, w, h }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_within_unit_range() {
        let bbox = BBox::new(0.2, 0.2, 0.5, 0.4);
        assert!((bbox.area() - 0.2).abs() < 1e-9);
        assert!(bbox.area() >= 0.0 && bbox.area() <= 1.0);
    }

    #[test]
    fn test_is_valid_rejects_overflow() {
        assert!(BBox::new(0.8, 0.0, 0.3, 0.2).is_valid() == false);
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_normalize_clamps_into_unit_square() {
        let bbox = BBox::new(-0.1, 0.9, 0.5, 0.5).normalize();
        assert!(bbox.is_valid());
        assert_eq!(bbox.x, 0.0);
        assert!((bbox.y + bbox.h) <= 1.0 + 1e-9);
    }

    #[test]
    fn test_normalize_is_identity_for_valid_boxes() {
        let bbox = BBox::new(0.25, 0.25, 0.5, 0.5);
        assert_eq!(bbox.normalize(), bbox);
    }

    #[test]
    fn test_json_round_trip() {
        let bbox = BBox::new(0.1, 0.2, 0.3, 0.4);
        let json = serde_json::to_string(&bbox).unwrap();
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(bbox, back);
    }
}

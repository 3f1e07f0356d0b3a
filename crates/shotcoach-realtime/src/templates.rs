//! Localized advice templates and the direction mapping table.
//!
//! Messages may carry named `{placeholder}` variables substituted at
//! emission via `AdvicePayload::with_substitution`.

use shotcoach_models::{AdviceCategory, AdvicePayload, AdvicePriority};

// Stability
pub const STABILITY_CRITICAL: &str = "画面抖动严重，请稳定持机或使用稳定器";
pub const STABILITY_CRITICAL_ADVANCED: &str = "建议双手持机贴近身体，降低行进速度，或开启机身防抖";
pub const STABILITY_WARNING: &str = "画面略有晃动，注意保持稳定";
pub const STABILITY_POSITIVE: &str = "画面很稳，继续保持";

// Speed
pub const SPEED_TOO_FAST: &str = "移动速度过快，请放慢运镜";
pub const SPEED_UNEVEN: &str = "移动速度不均匀，尽量保持匀速";
pub const SPEED_PERFECT: &str = "运镜速度恰到好处";

// Composition
pub const SUBJECT_OFF_CENTER: &str = "主体偏离构图点，建议向{direction}微调";
pub const SUBJECT_TOO_LARGE: &str = "主体占比过大，建议后退或拉远焦距";
pub const SUBJECT_TOO_SMALL: &str = "主体占比过小，建议靠近或推近焦距";
pub const SUBJECT_LOST: &str = "主体已丢失，请调整镜头重新找回主体";
pub const DIRECTION_HINT: &str = "当前向{direction}运动，保持方向一致，避免突然转向{avoid}";

// Beat
pub const BEAT_UPCOMING: &str = "节拍即将到来，准备卡点";
pub const BEAT_NOW: &str = "节拍点！现在切换动作";

// Equipment
pub const TELEPHOTO_SHAKE: &str = "长焦下抖动被放大，建议改用广角或加强稳定";
pub const STABILIZATION_SUGGESTION: &str = "画面持续不稳，建议使用三脚架或稳定器";

// Status
pub const ANALYZING: &str = "正在分析画面...";

/// Screen-space direction quadrants for motion (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenDirection {
    Right,
    Down,
    Left,
    Up,
}

impl ScreenDirection {
    /// Quadrant for an angle in degrees: 315..45 right, 45..135 down,
    /// 135..225 left, 225..315 up.
    pub fn from_angle_deg(angle: f64) -> Self {
        let angle = angle.rem_euclid(360.0);
        if (45.0..135.0).contains(&angle) {
            ScreenDirection::Down
        } else if (135.0..225.0).contains(&angle) {
            ScreenDirection::Left
        } else if (225.0..315.0).contains(&angle) {
            ScreenDirection::Up
        } else {
            ScreenDirection::Right
        }
    }

    /// Localized name of the motion direction.
    pub fn name(&self) -> &'static str {
        match self {
            ScreenDirection::Right => "右",
            ScreenDirection::Down => "下",
            ScreenDirection::Left => "左",
            ScreenDirection::Up => "上",
        }
    }

    /// The direction to warn against turning toward: the opposite.
    pub fn avoid(&self) -> &'static str {
        match self {
            ScreenDirection::Right => "左",
            ScreenDirection::Down => "上",
            ScreenDirection::Left => "右",
            ScreenDirection::Up => "下",
        }
    }
}

/// The single "analyzing" payload emitted below the confidence floor.
pub fn low_confidence_status() -> AdvicePayload {
    AdvicePayload::new(AdvicePriority::Info, AdviceCategory::Stability, ANALYZING)
        .with_suppress_ms(2000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_quadrants() {
        assert_eq!(ScreenDirection::from_angle_deg(0.0), ScreenDirection::Right);
        assert_eq!(ScreenDirection::from_angle_deg(44.9), ScreenDirection::Right);
        assert_eq!(ScreenDirection::from_angle_deg(90.0), ScreenDirection::Down);
        assert_eq!(ScreenDirection::from_angle_deg(180.0), ScreenDirection::Left);
        assert_eq!(ScreenDirection::from_angle_deg(270.0), ScreenDirection::Up);
        assert_eq!(ScreenDirection::from_angle_deg(359.0), ScreenDirection::Right);
        assert_eq!(ScreenDirection::from_angle_deg(-90.0), ScreenDirection::Up);
    }

    #[test]
    fn test_avoid_is_opposite() {
        assert_eq!(ScreenDirection::Right.avoid(), ScreenDirection::Left.name());
        assert_eq!(ScreenDirection::Up.avoid(), ScreenDirection::Down.name());
    }

    #[test]
    fn test_direction_hint_substitution() {
        let payload = AdvicePayload::new(
            shotcoach_models::AdvicePriority::Info,
            shotcoach_models::AdviceCategory::Composition,
            DIRECTION_HINT,
        )
        .with_substitution(&[("direction", "右"), ("avoid", "左")]);
        assert_eq!(payload.message, "当前向右运动，保持方向一致，避免突然转向左");
    }
}

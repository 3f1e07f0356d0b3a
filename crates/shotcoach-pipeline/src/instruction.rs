//! Instruction card generation: deterministic mapping from validated
//! metadata to a three-layer card with localized text. No external calls.

use shotcoach_models::{
    AdvancedParams, InstructionCard, MetadataOutput, MotionType, SpeedProfile, SuggestedScale,
};

/// Thresholds for the text mappings.
#[derive(Debug, Clone)]
pub struct InstructionGeneratorConfig {
    /// frame_pct_change below this reads as slow.
    pub slow_threshold: f64,
    /// frame_pct_change above this reads as fast.
    pub fast_threshold: f64,
    /// motion_smoothness above this maps to professional rigs.
    pub high_smoothness_threshold: f64,
    /// motion_smoothness below this maps to static setups.
    pub low_smoothness_threshold: f64,
    pub high_confidence_threshold: f64,
    pub medium_confidence_threshold: f64,
}

impl Default for InstructionGeneratorConfig {
    fn default() -> Self {
        Self {
            slow_threshold: 0.1,
            fast_threshold: 0.25,
            high_smoothness_threshold: 0.7,
            low_smoothness_threshold: 0.4,
            high_confidence_threshold: 0.75,
            medium_confidence_threshold: 0.55,
        }
    }
}

/// Speed band of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedCategory {
    Slow,
    Medium,
    Fast,
}

/// Equipment band derived from motion smoothness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentCategory {
    Professional,
    HandheldGimbal,
    Static,
}

/// Generates three-layer instruction cards from metadata.
#[derive(Debug, Clone, Default)]
pub struct InstructionGenerator {
    config: InstructionGeneratorConfig,
}

impl InstructionGenerator {
    pub fn new(config: InstructionGeneratorConfig) -> Self {
        Self { config }
    }

    /// Generate a complete card. The card always satisfies the completeness
    /// invariant: three non-empty layers, primary with 1-4 lines.
    pub fn generate(&self, metadata: &MetadataOutput, video_id: &str) -> InstructionCard {
        InstructionCard {
            video_id: video_id.to_string(),
            primary: self.generate_primary(metadata),
            explain: self.generate_explain(metadata),
            advanced: self.generate_advanced(metadata),
        }
    }

    // ------------------------------------------------------------------
    // Speed mapping
    // ------------------------------------------------------------------

    pub fn speed_category(&self, frame_pct_change: f64) -> SpeedCategory {
        if frame_pct_change < self.config.slow_threshold {
            SpeedCategory::Slow
        } else if frame_pct_change <= self.config.fast_threshold {
            SpeedCategory::Medium
        } else {
            SpeedCategory::Fast
        }
    }

    /// Speed descriptor combining the band with a per-motion direction word.
    pub fn map_speed_description(&self, frame_pct_change: f64, motion_type: MotionType) -> String {
        let direction = match motion_type {
            MotionType::DollyIn => "推进",
            MotionType::DollyOut => "拉远",
            MotionType::Pan => "横移",
            MotionType::Tilt => "纵移",
            MotionType::Track => "跟踪",
            MotionType::Handheld => "手持移动",
            MotionType::Static => return "静止".to_string(),
        };

        match self.speed_category(frame_pct_change) {
            SpeedCategory::Slow => format!("缓慢{direction}"),
            SpeedCategory::Medium => format!("中速{direction}"),
            SpeedCategory::Fast => {
                if matches!(motion_type, MotionType::DollyIn | MotionType::DollyOut) {
                    format!("快速{direction}或换镜头")
                } else {
                    format!("快速{direction}")
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Equipment mapping
    // ------------------------------------------------------------------

    pub fn equipment_category(&self, motion_smoothness: f64) -> EquipmentCategory {
        if motion_smoothness > self.config.high_smoothness_threshold {
            EquipmentCategory::Professional
        } else if motion_smoothness >= self.config.low_smoothness_threshold {
            EquipmentCategory::HandheldGimbal
        } else {
            EquipmentCategory::Static
        }
    }

    pub fn map_equipment_suggestion(&self, motion_smoothness: f64) -> &'static str {
        match self.equipment_category(motion_smoothness) {
            EquipmentCategory::Professional => "建议使用滑轨/电动滑轨/三轴稳定器",
            EquipmentCategory::HandheldGimbal => "建议手持配合云台/稳定器使用",
            EquipmentCategory::Static => "建议使用三脚架静态拍摄或减少运动幅度",
        }
    }

    /// Stabilization recommendation: equipment category crossed with motion type.
    pub fn stabilization_recommendation(
        &self,
        motion_smoothness: f64,
        motion_type: MotionType,
    ) -> &'static str {
        match self.equipment_category(motion_smoothness) {
            EquipmentCategory::Professional => match motion_type {
                MotionType::DollyIn | MotionType::DollyOut => "电动滑轨或轨道车",
                MotionType::Track => "三轴稳定器或斯坦尼康",
                MotionType::Pan | MotionType::Tilt => "电动云台或液压云台",
                _ => "三轴稳定器",
            },
            EquipmentCategory::HandheldGimbal => match motion_type {
                MotionType::Handheld => "手持稳定器",
                _ => "手持云台",
            },
            EquipmentCategory::Static => match motion_type {
                MotionType::Static => "三脚架",
                _ => "三脚架或独脚架",
            },
        }
    }

    // ------------------------------------------------------------------
    // Layer 1: primary
    // ------------------------------------------------------------------

    fn generate_primary(&self, metadata: &MetadataOutput) -> Vec<String> {
        let motion_type = metadata.motion_type();
        let params = metadata.motion_params();
        let confidence = metadata.confidence;

        let mut lines = Vec::with_capacity(4);

        lines.push(format!(
            "时间段 {:.1}s - {:.1}s：{}",
            metadata.time_range.0,
            metadata.time_range.1,
            action_type_name(motion_type),
        ));

        lines.push(format!(
            "运动方式：{}，持续 {:.1} 秒",
            self.map_speed_description(params.frame_pct_change, motion_type),
            params.duration_s,
        ));

        lines.push(self.map_equipment_suggestion(params.motion_smoothness).to_string());

        let confidence_pct = (confidence * 100.0).round() as i64;
        if confidence > self.config.high_confidence_threshold {
            lines.push(format!("置信度：{confidence_pct}%，推荐执行"));
        } else if confidence >= self.config.medium_confidence_threshold {
            lines.push(format!("置信度：{confidence_pct}%，请尝试并拍摄两条版本"));
        } else {
            lines.push(format!(
                "置信度：{confidence_pct}%，建议人工确认。备选：{}",
                alternative_suggestion(motion_type),
            ));
        }

        lines
    }

    // ------------------------------------------------------------------
    // Layer 2: explain
    // ------------------------------------------------------------------

    fn generate_explain(&self, metadata: &MetadataOutput) -> String {
        let mut sentences = Vec::with_capacity(3);
        sentences.push(self.explain_motion(metadata));
        sentences.push(self.explain_framing(metadata));
        if metadata.beat_alignment > 0.5 {
            sentences.push(explain_rhythm(metadata.beat_alignment).to_string());
        }
        sentences.concat()
    }

    fn explain_motion(&self, metadata: &MetadataOutput) -> String {
        let smoothness = metadata.motion_params().motion_smoothness;
        let smoothness_desc = if smoothness > 0.7 {
            "流畅"
        } else if smoothness > 0.4 {
            "适中"
        } else {
            "需要稳定"
        };

        match metadata.motion_type() {
            MotionType::DollyIn => {
                format!("画面呈现向前推进的特征，主体逐渐放大，运动{smoothness_desc}。")
            }
            MotionType::DollyOut => {
                format!("画面呈现向后拉远的特征，展示更多环境，运动{smoothness_desc}。")
            }
            MotionType::Pan => {
                format!("画面呈现水平横移特征，适合展示宽广场景，运动{smoothness_desc}。")
            }
            MotionType::Tilt => {
                format!("画面呈现垂直移动特征，适合展示高度变化，运动{smoothness_desc}。")
            }
            MotionType::Track => format!(
                "画面呈现跟随主体运动的特征，保持主体在画面中的位置，运动{smoothness_desc}。"
            ),
            MotionType::Handheld => "画面呈现手持拍摄的自然晃动特征，具有临场感。".to_string(),
            MotionType::Static => "画面稳定无明显运动，适合静态构图或等待动作发生。".to_string(),
        }
    }

    fn explain_framing(&self, metadata: &MetadataOutput) -> String {
        let occupancy = metadata.framing.subject_occupancy;
        let occupancy_pct = (occupancy * 100.0) as i64;
        let scale_desc = scale_name(metadata.framing.suggested_scale);

        if occupancy >= 0.5 {
            format!("主体占画面约{occupancy_pct}%，构图紧凑，建议{scale_desc}拍摄以突出主体细节。")
        } else if occupancy >= 0.25 {
            format!("主体占画面约{occupancy_pct}%，构图均衡，建议{scale_desc}拍摄以平衡主体与环境。")
        } else if occupancy >= 0.1 {
            format!("主体占画面约{occupancy_pct}%，环境占比较大，建议{scale_desc}拍摄以展示场景氛围。")
        } else {
            format!("主体占画面约{occupancy_pct}%，以环境为主，建议{scale_desc}拍摄以呈现整体场景。")
        }
    }

    // ------------------------------------------------------------------
    // Layer 3: advanced
    // ------------------------------------------------------------------

    fn generate_advanced(&self, metadata: &MetadataOutput) -> AdvancedParams {
        let params = metadata.motion_params();
        let motion_type = metadata.motion_type();

        AdvancedParams {
            target_occupancy: target_occupancy_text(
                metadata.framing.subject_occupancy,
                metadata.framing.suggested_scale,
            ),
            duration_s: params.duration_s,
            speed_curve: speed_curve_text(params.speed_profile).to_string(),
            stabilization: self
                .stabilization_recommendation(params.motion_smoothness, motion_type)
                .to_string(),
            notes: self.professional_notes(metadata),
        }
    }

    fn professional_notes(&self, metadata: &MetadataOutput) -> Vec<String> {
        let mut notes = Vec::new();
        let params = metadata.motion_params();
        let motion_type = metadata.motion_type();

        if let Some(estimate) =
            physical_movement_estimate(motion_type, params.frame_pct_change, params.duration_s)
        {
            notes.push(estimate);
        }

        if let Some(lens) = lens_suggestion(metadata.framing.suggested_scale, motion_type) {
            notes.push(lens);
        }

        if metadata.beat_alignment > 0.5 {
            notes.push("注意与音乐节拍配合，可在节拍点开始或结束运动".to_string());
        }

        if params.motion_smoothness < 0.5 {
            notes.push("当前运动较为抖动，建议增加稳定措施或降低运动速度".to_string());
        }

        if let Some(tip) = composition_tip(metadata.framing.suggested_scale) {
            notes.push(tip.to_string());
        }

        notes
    }
}

fn action_type_name(motion_type: MotionType) -> &'static str {
    match motion_type {
        MotionType::DollyIn => "推镜头",
        MotionType::DollyOut => "拉镜头",
        MotionType::Pan => "横摇镜头",
        MotionType::Tilt => "纵摇镜头",
        MotionType::Track => "跟踪镜头",
        MotionType::Handheld => "手持镜头",
        MotionType::Static => "静态镜头",
    }
}

fn alternative_suggestion(motion_type: MotionType) -> &'static str {
    match motion_type {
        MotionType::DollyIn => "静态特写或缓慢推进",
        MotionType::DollyOut => "静态全景或缓慢拉远",
        MotionType::Pan => "静态拍摄或分段横摇",
        MotionType::Tilt => "静态拍摄或分段纵摇",
        MotionType::Track => "固定机位跟拍或手持跟踪",
        MotionType::Handheld => "三脚架固定拍摄",
        MotionType::Static => "保持当前静态拍摄",
    }
}

fn scale_name(scale: SuggestedScale) -> &'static str {
    match scale {
        SuggestedScale::ExtremeCloseup => "特写",
        SuggestedScale::Closeup => "近景",
        SuggestedScale::Medium => "中景",
        SuggestedScale::Wide => "远景/全景",
    }
}

fn explain_rhythm(beat_alignment: f64) -> &'static str {
    if beat_alignment > 0.8 {
        "镜头运动与音乐节拍高度同步，建议保持这种节奏感。"
    } else if beat_alignment > 0.6 {
        "镜头运动与音乐节拍较为同步，可适当强化节奏配合。"
    } else {
        "镜头运动与音乐节拍有一定关联，可考虑调整以增强节奏感。"
    }
}

fn target_occupancy_text(current_occupancy: f64, scale: SuggestedScale) -> String {
    let target = match scale {
        SuggestedScale::ExtremeCloseup => "60%-80%",
        SuggestedScale::Closeup => "40%-60%",
        SuggestedScale::Medium => "20%-40%",
        SuggestedScale::Wide => "5%-20%",
    };
    format!("当前{}%，目标{}", (current_occupancy * 100.0) as i64, target)
}

fn speed_curve_text(profile: SpeedProfile) -> &'static str {
    match profile {
        SpeedProfile::EaseIn => "渐入（开始慢，逐渐加速）",
        SpeedProfile::EaseOut => "渐出（开始快，逐渐减速）",
        SpeedProfile::EaseInOut => "渐入渐出（两端慢，中间快）",
        SpeedProfile::Linear => "线性（匀速运动）",
    }
}

/// Estimate physical camera travel or rotation from the frame change.
fn physical_movement_estimate(
    motion_type: MotionType,
    frame_pct_change: f64,
    duration_s: f64,
) -> Option<String> {
    match motion_type {
        MotionType::Static => None,
        MotionType::DollyIn | MotionType::DollyOut => {
            // Rough calibration: 10% area change per ~0.5m of travel.
            let distance_m = frame_pct_change * 5.0;
            let speed = if duration_s > 0.0 {
                distance_m / duration_s
            } else {
                0.0
            };
            Some(format!(
                "预估移动距离约 {distance_m:.1}m，速度约 {speed:.2}m/s"
            ))
        }
        MotionType::Pan | MotionType::Tilt => {
            let angle_deg = frame_pct_change * 150.0;
            let angular_speed = if duration_s > 0.0 {
                angle_deg / duration_s
            } else {
                0.0
            };
            let axis = if motion_type == MotionType::Pan {
                "水平"
            } else {
                "垂直"
            };
            Some(format!(
                "预估{axis}旋转约 {angle_deg:.0}°，角速度约 {angular_speed:.1}°/s"
            ))
        }
        MotionType::Track => {
            let distance_m = frame_pct_change * 3.0;
            Some(format!("预估跟踪距离约 {distance_m:.1}m"))
        }
        MotionType::Handheld => None,
    }
}

fn lens_suggestion(scale: SuggestedScale, motion_type: MotionType) -> Option<String> {
    let base = match scale {
        SuggestedScale::ExtremeCloseup => "85-135mm 或微距镜头",
        SuggestedScale::Closeup => "50-85mm",
        SuggestedScale::Medium => "35-50mm",
        SuggestedScale::Wide => "16-35mm 广角镜头",
    };

    Some(match motion_type {
        MotionType::DollyIn | MotionType::DollyOut => {
            format!("建议焦段：{base}，推拉镜头可考虑变焦镜头配合")
        }
        MotionType::Handheld => format!("建议焦段：{base}，手持拍摄建议使用防抖镜头"),
        _ => format!("建议焦段：{base}"),
    })
}

fn composition_tip(scale: SuggestedScale) -> Option<&'static str> {
    Some(match scale {
        SuggestedScale::ExtremeCloseup => "特写构图注意眼神光和皮肤质感",
        SuggestedScale::Closeup => "近景构图注意头部空间和视线方向",
        SuggestedScale::Medium => "中景构图注意人物与环境的平衡",
        SuggestedScale::Wide => "远景构图注意前景元素和景深层次",
    })
}

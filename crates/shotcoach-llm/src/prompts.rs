//! Few-shot prompt construction and lenient response parsing for metadata
//! synthesis.

use serde_json::{json, Value};

use shotcoach_models::{ExifData, HeuristicIndicators};

use crate::error::{LlmError, LlmResult};

/// System prompt for metadata synthesis.
pub const SYSTEM_PROMPT: &str = "你是一个专业的视频拍摄分析助手。你的任务是根据视频分析数据生成结构化的拍摄元数据。

你需要分析以下指标并生成JSON格式的元数据：
- avg_motion_px_per_s: 平均运动速度（像素/秒）
- frame_pct_change: 画幅占比变化率（0-1）
- motion_smoothness: 运动平滑度（0-1，越高越平滑）
- subject_occupancy: 主体占比（0-1）
- beat_alignment: 节拍对齐度（0-1）

你需要输出以下字段：
1. motion.type: 运动类型 (dolly_in/dolly_out/pan/tilt/track/handheld/static)
2. motion.params.speed_profile: 速度曲线 (ease_in/ease_out/ease_in_out/linear)
3. framing.suggested_scale: 建议景别 (extreme_closeup/closeup/medium/wide)
4. confidence: 置信度 (0-1)
5. explainability: 2句话的中文解释

请严格按照JSON格式输出，不要添加额外的文字说明。";

/// Canonical few-shot example pairs (input indicators, expected output).
fn few_shot_examples() -> Vec<(Value, Value)> {
    vec![
        (
            json!({
                "avg_motion_px_per_s": 2.5,
                "frame_pct_change": 0.02,
                "motion_smoothness": 0.95,
                "subject_occupancy": 0.35,
                "beat_alignment": 0.6,
                "exif": {"focal_length_mm": 50, "aperture": 2.8}
            }),
            json!({
                "motion": {"type": "static", "params": {"speed_profile": "linear"}},
                "framing": {"suggested_scale": "medium"},
                "confidence": 0.92,
                "explainability": "该镜头几乎没有运动，属于静态镜头。主体占画面约35%，适合中景构图。"
            }),
        ),
        (
            json!({
                "avg_motion_px_per_s": 85.0,
                "frame_pct_change": 0.18,
                "motion_smoothness": 0.78,
                "subject_occupancy": 0.45,
                "beat_alignment": 0.75,
                "exif": {"focal_length_mm": 35, "aperture": 4.0}
            }),
            json!({
                "motion": {"type": "dolly_in", "params": {"speed_profile": "ease_in_out"}},
                "framing": {"suggested_scale": "closeup"},
                "confidence": 0.85,
                "explainability": "画幅变化明显（18%），表明镜头在推进。运动平滑度较高，建议使用渐入渐出的速度曲线。"
            }),
        ),
        (
            json!({
                "avg_motion_px_per_s": 120.0,
                "frame_pct_change": 0.05,
                "motion_smoothness": 0.65,
                "subject_occupancy": 0.15,
                "beat_alignment": 0.45,
                "exif": {"focal_length_mm": 24, "aperture": 5.6}
            }),
            json!({
                "motion": {"type": "pan", "params": {"speed_profile": "linear"}},
                "framing": {"suggested_scale": "medium"},
                "confidence": 0.72,
                "explainability": "运动速度中等但画幅变化小，符合横摇特征。广角镜头配合中景构图适合展示环境。"
            }),
        ),
        (
            json!({
                "avg_motion_px_per_s": 180.0,
                "frame_pct_change": 0.08,
                "motion_smoothness": 0.35,
                "subject_occupancy": 0.25,
                "beat_alignment": 0.55,
                "exif": {"focal_length_mm": 85, "aperture": 1.8}
            }),
            json!({
                "motion": {"type": "handheld", "params": {"speed_profile": "linear"}},
                "framing": {"suggested_scale": "closeup"},
                "confidence": 0.68,
                "explainability": "运动平滑度较低（0.35），呈现手持拍摄特征。长焦镜头配合近景可以突出主体。"
            }),
        ),
    ]
}

fn indicators_json(indicators: &HeuristicIndicators, exif: Option<&ExifData>) -> Value {
    let mut input = json!({
        "avg_motion_px_per_s": indicators.avg_motion_px_per_s,
        "frame_pct_change": indicators.frame_pct_change,
        "motion_smoothness": indicators.motion_smoothness,
        "subject_occupancy": indicators.subject_occupancy,
        "beat_alignment": indicators.beat_alignment,
        "time_range": [indicators.time_range.0, indicators.time_range.1],
    });
    if let Some(exif) = exif {
        input["exif"] = json!({
            "focal_length_mm": exif.focal_length_mm,
            "aperture": exif.aperture,
            "sensor_size": exif.sensor_size,
        });
    }
    input
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Build the few-shot prompt with `num_examples` example pairs (clamped 2-4).
pub fn build_few_shot_prompt(
    indicators: &HeuristicIndicators,
    exif: Option<&ExifData>,
    num_examples: usize,
) -> String {
    let examples = few_shot_examples();
    let count = num_examples.clamp(2, 4).min(examples.len());

    let mut examples_text = String::new();
    for (i, (input, output)) in examples.iter().take(count).enumerate() {
        examples_text.push_str(&format!(
            "\n### 示例 {}\n输入数据:\n```json\n{}\n```\n输出:\n```json\n{}\n```\n",
            i + 1,
            pretty(input),
            pretty(output),
        ));
    }

    format!(
        "{SYSTEM_PROMPT}\n\n## 示例\n{examples_text}\n## 当前任务\n\n请根据以下视频分析数据生成元数据：\n\n输入数据:\n```json\n{}\n```\n\n请输出完整的JSON格式元数据，包含motion、framing、confidence和explainability字段。\n只输出JSON，不要添加其他文字。",
        pretty(&indicators_json(indicators, exif)),
    )
}

/// Build a shorter prompt without examples, for tight token budgets.
pub fn build_simple_prompt(indicators: &HeuristicIndicators, exif: Option<&ExifData>) -> String {
    format!(
        "分析以下视频数据并生成拍摄元数据JSON：\n\n数据: {}\n\n输出格式要求：\n{{\n  \"motion\": {{\n    \"type\": \"dolly_in|dolly_out|pan|tilt|track|handheld|static\",\n    \"params\": {{ \"speed_profile\": \"ease_in|ease_out|ease_in_out|linear\" }}\n  }},\n  \"framing\": {{ \"suggested_scale\": \"extreme_closeup|closeup|medium|wide\" }},\n  \"confidence\": 0.0-1.0,\n  \"explainability\": \"2句话中文解释\"\n}}\n\n只输出JSON。",
        pretty(&indicators_json(indicators, exif)),
    )
}

/// Extract a JSON object from a model response.
///
/// Tries, in order: the raw text, the contents of a fenced code block, and
/// the first balanced `{...}` substring.
pub fn parse_model_response(response: &str) -> LlmResult<Value> {
    let trimmed = response.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if let Some(candidate) = extract_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    let preview: String = trimmed.chars().take(200).collect();
    Err(LlmError::MalformedResponse(format!(
        "could not extract JSON object from response: {preview}"
    )))
}

/// Contents of the first ``` fence, tolerating a `json` language tag.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence
        .strip_prefix("json")
        .unwrap_or(after_fence)
        .trim_start_matches(['\r', '\n']);
    let end = body_start.find("```")?;
    Some(&body_start[..end])
}

/// First balanced `{...}` substring, brace-counting outside string literals.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators() -> HeuristicIndicators {
        HeuristicIndicators {
            video_id: "vid-1".to_string(),
            time_range: (0.0, 4.0),
            avg_motion_px_per_s: 85.0,
            frame_pct_change: 0.18,
            motion_smoothness: 0.78,
            subject_occupancy: 0.45,
            beat_alignment: 0.75,
        }
    }

    #[test]
    fn test_few_shot_prompt_contains_examples_and_input() {
        let prompt = build_few_shot_prompt(&indicators(), None, 3);
        assert!(prompt.contains("### 示例 1"));
        assert!(prompt.contains("### 示例 3"));
        assert!(!prompt.contains("### 示例 4"));
        assert!(prompt.contains("\"avg_motion_px_per_s\": 85.0"));
        assert!(prompt.contains("只输出JSON"));
    }

    #[test]
    fn test_example_count_clamped() {
        let prompt = build_few_shot_prompt(&indicators(), None, 0);
        assert!(prompt.contains("### 示例 2"));
        let prompt = build_few_shot_prompt(&indicators(), None, 99);
        assert!(prompt.contains("### 示例 4"));
    }

    #[test]
    fn test_exif_included_when_present() {
        let exif = ExifData {
            focal_length_mm: Some(35.0),
            aperture: Some(4.0),
            ..Default::default()
        };
        let prompt = build_simple_prompt(&indicators(), Some(&exif));
        assert!(prompt.contains("focal_length_mm"));
    }

    #[test]
    fn test_parse_raw_json() {
        let value = parse_model_response(r#"{"confidence": 0.8}"#).unwrap();
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn test_parse_fenced_block() {
        let response = "Here you go:\n```json\n{\"confidence\": 0.8}\n```\nDone.";
        let value = parse_model_response(response).unwrap();
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn test_parse_embedded_object() {
        let response = "The metadata is {\"motion\": {\"type\": \"pan\"}} as requested.";
        let value = parse_model_response(response).unwrap();
        assert_eq!(value["motion"]["type"], "pan");
    }

    #[test]
    fn test_parse_object_with_braces_in_strings() {
        let response = r#"noise {"explainability": "包含{花括号}的文本", "confidence": 0.7} noise"#;
        let value = parse_model_response(response).unwrap();
        assert_eq!(value["confidence"], 0.7);
    }

    #[test]
    fn test_parse_failure_is_retryable() {
        let error = parse_model_response("I cannot answer that.").unwrap_err();
        assert!(error.is_retryable());
    }
}

//! Parsing of memory-extraction responses.
//!
//! Models are asked for a bare JSON array but routinely wrap it in code
//! fences or prose; the salvage path digs the array out. Parsing failures
//! yield an empty list — extraction is strictly best-effort.

use pulsebot_core::memory::MemoryType;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMemory {
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: f32,
}

/// Parse an extraction response into memory entries.
pub fn parse_extraction(raw: &str) -> Vec<ExtractedMemory> {
    let body = strip_code_fences(raw.trim());
    if body.is_empty() {
        return Vec::new();
    }

    if let Some(entries) = parse_array(&body) {
        return entries;
    }

    // Salvage: the model wrapped the array in explanatory text.
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Some(entries) = parse_array(&body[start..=end]) {
                debug!("Salvaged extraction array from surrounding text");
                return entries;
            }
        }
    }

    debug!(preview = %&body[..body.len().min(120)], "Unparseable extraction response");
    Vec::new()
}

fn parse_array(s: &str) -> Option<Vec<ExtractedMemory>> {
    let value: serde_json::Value = serde_json::from_str(s).ok()?;
    let items = value.as_array()?;

    Some(
        items
            .iter()
            .filter_map(|item| {
                let content = item.get("content")?.as_str()?.trim();
                if content.is_empty() {
                    return None;
                }
                Some(ExtractedMemory {
                    memory_type: MemoryType::parse_lossy(
                        item.get("type").and_then(|v| v.as_str()).unwrap_or("fact"),
                    ),
                    content: content.to_string(),
                    importance: item
                        .get("importance")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.5)
                        .clamp(0.0, 1.0) as f32,
                })
            })
            .collect(),
    )
}

fn strip_code_fences(s: &str) -> String {
    let Some(rest) = s.strip_prefix("```") else {
        return s.to_string();
    };
    // Skip the info string ("json") on the fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.split("```").next().unwrap_or("").trim().to_string()
}

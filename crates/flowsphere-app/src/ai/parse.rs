//! Heuristic parsing of free-text completions.

use flowsphere_core::Priority;
use serde::Serialize;
use uuid::Uuid;

const ACTION_MARKER: &str = "ACTION:";
const DEFAULT_BLOCK_MINUTES: u32 = 30;

/// A completion split into prose, suggestions and actions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiResponse {
    /// The full text.
    pub content: String,
    /// Bullet lines without their bullet.
    pub suggestions: Vec<String>,
    /// Lines marked as actions.
    pub actions: Vec<AiAction>,
    /// True when this is the canned answer rather than a provider's.
    pub fallback: bool,
}

/// Something the assistant proposes to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiAction {
    /// Fresh per parsed response.
    pub id: Uuid,
    /// Action category; always `general` for now.
    #[serde(rename = "type")]
    pub kind: String,
    /// Text after the marker.
    pub title: String,
    /// Same text as the title.
    pub description: String,
}

/// A suggested focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBlock {
    /// Task the block is for.
    pub title: String,
    /// Suggested length.
    pub duration_minutes: u32,
    /// Suggested priority.
    pub priority: Priority,
}

fn bullet(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('•'))
        .map(str::trim)
}

/// Bullet items of `text`, blanks dropped.
#[must_use]
pub fn bullets(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(bullet)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Split `content` into suggestions and `ACTION:` lines.
#[must_use]
pub fn parse_response(content: &str) -> AiResponse {
    let actions = content
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once(ACTION_MARKER)?;
            let title = rest.trim();
            (!title.is_empty()).then(|| AiAction {
                id: Uuid::new_v4(),
                kind: "general".to_owned(),
                title: title.to_owned(),
                description: title.to_owned(),
            })
        })
        .collect();
    AiResponse {
        content: content.to_owned(),
        suggestions: bullets(content),
        actions,
        fallback: false,
    }
}

fn leading_number(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|minutes| *minutes > 0)
}

/// `Title | Duration | Priority` lines; anything else is skipped.
#[must_use]
pub fn parse_time_blocks(content: &str) -> Vec<TimeBlock> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            let [title, duration, priority] = parts.as_slice() else {
                return None;
            };
            let title = title.trim_start_matches(['-', '•']).trim().trim_matches('"');
            if title.is_empty() {
                return None;
            }
            Some(TimeBlock {
                title: title.to_owned(),
                duration_minutes: leading_number(duration).unwrap_or(DEFAULT_BLOCK_MINUTES),
                priority: priority.trim_matches('"').parse().unwrap_or(Priority::Medium),
            })
        })
        .collect()
}

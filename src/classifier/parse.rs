//! Classifier response parsing — strict JSON with a heuristic fallback.
//!
//! The model is asked for a strict JSON object but is not trusted to
//! produce one: responses arrive fenced in Markdown, wrapped in prose, or
//! truncated. The ladder is: strip fences → strict parse → regex field
//! extraction. A present-but-malformed response is never dropped outright;
//! only a response with no recoverable fields at all is reported as
//! unparsable.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::store::ModAction;

/// How a classification result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// The response parsed as strict JSON.
    Strict,
    /// Fields were recovered heuristically from malformed text.
    Heuristic,
    /// Nothing recoverable; the caller should treat the post as approved.
    Unparsable,
}

/// Classifier verdict for a single post.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub approved: bool,
    pub action: ModAction,
    pub reason: String,
    pub demotion_levels: u32,
    pub target_rank_name: String,
    /// True when this is the fail-safe default produced because the
    /// classifier call itself failed (quota, outage).
    pub degraded: bool,
}

impl ClassificationResult {
    /// Fail-safe default: never punish a user when the classifier is
    /// unavailable or unintelligible.
    pub fn approved_default() -> Self {
        Self {
            approved: true,
            action: ModAction::None,
            reason: String::new(),
            demotion_levels: 1,
            target_rank_name: String::new(),
            degraded: false,
        }
    }

    /// The degraded-mode variant of [`Self::approved_default`].
    pub fn degraded_default() -> Self {
        Self {
            degraded: true,
            ..Self::approved_default()
        }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    approved: bool,
    #[serde(default)]
    action: String,
    #[serde(default)]
    reason: String,
    #[serde(default = "default_demotion_levels", rename = "demotionLevels")]
    demotion_levels: u32,
    #[serde(default, rename = "targetRank")]
    target_rank: String,
}

fn default_demotion_levels() -> u32 {
    1
}

/// Parse a raw model response into a verdict plus how it was recovered.
pub fn parse_verdict(raw: &str) -> (ClassificationResult, ParseMode) {
    let json_str = strip_fences(raw);

    if let Ok(v) = serde_json::from_str::<RawVerdict>(&json_str) {
        return (
            ClassificationResult {
                approved: v.approved,
                action: ModAction::parse(&v.action.to_lowercase()),
                reason: v.reason,
                demotion_levels: v.demotion_levels,
                target_rank_name: v.target_rank,
                degraded: false,
            },
            ParseMode::Strict,
        );
    }

    match extract_fields(raw) {
        Some(result) => (result, ParseMode::Heuristic),
        None => (ClassificationResult::approved_default(), ParseMode::Unparsable),
    }
}

/// Strip a Markdown code fence and surrounding prose, leaving the JSON
/// object candidate.
fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

static APPROVED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""approved"\s*:\s*(true|false)"#).unwrap());
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""action"\s*:\s*"([A-Za-z]+)""#).unwrap());
static REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""reason"\s*:\s*"([^"]*)""#).unwrap());
static LEVELS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""demotionLevels"\s*:\s*(\d+)"#).unwrap());
static TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""targetRank"\s*:\s*"([^"]*)""#).unwrap());

/// Recover fields from malformed text. `approved` is the anchor: without it
/// there is no verdict to recover.
fn extract_fields(raw: &str) -> Option<ClassificationResult> {
    let approved = APPROVED_RE.captures(raw)?.get(1)?.as_str() == "true";

    let action = ACTION_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| ModAction::parse(&m.as_str().to_lowercase()))
        .unwrap_or(ModAction::None);

    let reason = REASON_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let demotion_levels = LEVELS_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);

    let target_rank_name = TARGET_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Some(ClassificationResult {
        approved,
        action,
        reason,
        demotion_levels,
        target_rank_name,
        degraded: false,
    })
}

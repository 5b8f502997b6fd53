use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const DEFAULT_RATING: u8 = 3;

const EMPTY_ASSESSMENT: &str = "No written assessment was returned for this listing.";

static RATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)RATING:\s*(\d)").expect("rating regex"));

static ASSESSMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)ASSESSMENT:(.*)$").expect("assessment regex"));

static LEADING_ARTIFACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-:]\s*").expect("artifact regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub rating: u8,
    pub assessment: String,
}

impl AnalysisResult {
    pub fn label(&self) -> &'static str {
        rating_label(self.rating)
    }
}

/// Display label for a rating, as shown by the web front end.
pub fn rating_label(rating: u8) -> &'static str {
    match rating.clamp(MIN_RATING, MAX_RATING) {
        5 => "Absolute Steal!",
        4 => "Great Deal",
        3 => "Fair Price",
        2 => "Slightly Overpriced",
        _ => "Overpriced",
    }
}

/// Reads `RATING: <n>` / `ASSESSMENT: <text>` out of a free-text model reply.
///
/// Never fails. The rating is always within `MIN_RATING..=MAX_RATING` and
/// defaults to `DEFAULT_RATING` without a marker; without an assessment marker
/// the whole reply (minus the rating marker) is the assessment.
pub fn parse_reply(text: &str) -> AnalysisResult {
    let rating = RATING_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
        .unwrap_or(DEFAULT_RATING)
        .clamp(MIN_RATING, MAX_RATING);

    let raw = match ASSESSMENT_RE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => RATING_RE.replace_all(text, "").into_owned(),
    };

    let trimmed = raw.trim();
    let cleaned = LEADING_ARTIFACT_RE.replace(trimmed, "");
    let assessment = if cleaned.trim().is_empty() {
        EMPTY_ASSESSMENT.to_string()
    } else {
        cleaned.trim_end().to_string()
    };

    AnalysisResult { rating, assessment }
}

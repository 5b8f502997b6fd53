use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::AnalysisResult;
use crate::listing::ListingData;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub rating: u8,
    pub assessment: String,
    pub item: ItemSummary,
}

/// Listing fields echoed back to the caller. Absent fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub image: Option<String>,
}

impl AnalyzeResponse {
    pub fn new(listing: &ListingData, result: AnalysisResult) -> Self {
        Self {
            rating: result.rating,
            assessment: result.assessment,
            item: ItemSummary {
                title: listing.title.clone(),
                brand: listing.brand.clone(),
                price: listing.price.clone(),
                image: listing.cover_image().map(str::to_string),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_uses_first_image_and_null_for_absent() {
        let listing = ListingData {
            title: Some("Wool Coat".into()),
            price: Some("€45".into()),
            images: vec!["https://a/1.jpg".into(), "https://a/2.jpg".into()],
            ..ListingData::default()
        };
        let result = AnalysisResult {
            rating: 4,
            assessment: "Good.".into(),
        };
        let value = serde_json::to_value(AnalyzeResponse::new(&listing, result)).unwrap();
        assert_eq!(
            value,
            json!({
                "rating": 4,
                "assessment": "Good.",
                "item": {
                    "title": "Wool Coat",
                    "brand": null,
                    "price": "€45",
                    "image": "https://a/1.jpg"
                }
            })
        );
    }

    #[test]
    fn request_url_is_optional() {
        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_none());
    }
}

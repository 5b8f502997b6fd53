#![allow(non_snake_case)]

use serde::Deserialize;
use serde_json::Value;

/// Fields scraped from one listing page. Built per request, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingData {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub images: Vec<String>,
    pub source_url: String,
}

impl ListingData {
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Minimum data needed to be worth sending to the model.
    pub fn has_minimum_data(&self) -> bool {
        self.title.is_some() || self.price.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrandField {
    Named { name: Option<String> },
    Text(String),
}

impl BrandField {
    pub fn name(&self) -> Option<&str> {
        match self {
            BrandField::Named { name } => name.as_deref(),
            BrandField::Text(value) => Some(value.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Offer {
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub priceCurrency: Option<String>,
}

impl Offer {
    /// `price` as text, whether the page encoded it as a string or a number.
    pub fn amount(&self) -> Option<String> {
        match self.price.as_ref()? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
        .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OffersField {
    // Listed first: a struct also accepts a sequence, so `Single` would swallow arrays.
    Multiple(Vec<Offer>),
    Single(Offer),
}

impl OffersField {
    pub fn first(&self) -> Option<&Offer> {
        match self {
            OffersField::Multiple(offers) => offers.first(),
            OffersField::Single(offer) => Some(offer),
        }
    }
}

/// The schema.org `Product` subset read from an embedded ld+json block.
///
/// Every field is optional and unknown keys are ignored, so any `Product`-shaped
/// object deserializes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructuredListingHint {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<BrandField>,
    #[serde(default)]
    pub offers: Option<OffersField>,
    #[serde(default)]
    pub itemCondition: Option<String>,
}

impl StructuredListingHint {
    pub fn offer(&self) -> Option<&Offer> {
        self.offers.as_ref().and_then(OffersField::first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_reads_brand_and_offer_shapes() {
        let hint: StructuredListingHint = serde_json::from_str(
            r#"{"@type":"Product","name":"Boots","brand":"Dr. Martens",
                "offers":[{"price":"60","priceCurrency":"EUR"},{"price":"70"}],
                "itemCondition":"https://schema.org/NewCondition","sku":"x"}"#,
        )
        .expect("hint");
        assert_eq!(hint.brand.as_ref().and_then(BrandField::name), Some("Dr. Martens"));
        assert_eq!(hint.offer().and_then(Offer::amount).as_deref(), Some("60"));

        let hint: StructuredListingHint = serde_json::from_str(
            r#"{"brand":{"@type":"Brand","name":"Zara"},"offers":{"price":12.5}}"#,
        )
        .expect("hint");
        assert_eq!(hint.brand.as_ref().and_then(BrandField::name), Some("Zara"));
        assert_eq!(hint.offer().and_then(Offer::amount).as_deref(), Some("12.5"));
    }

    #[test]
    fn minimum_data_needs_title_or_price() {
        let mut listing = ListingData::default();
        assert!(!listing.has_minimum_data());
        listing.price = Some("€5".into());
        assert!(listing.has_minimum_data());
    }
}

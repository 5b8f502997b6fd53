//! Field extraction from listing HTML.
//!
//! Every field is resolved by an ordered list of rules; the first rule that
//! yields a non-blank value wins. Structured data rules come first, then the
//! page's Open Graph tags and substring patterns over the raw HTML. No rule can
//! fail: a missing or malformed source only makes that rule yield nothing.

use crate::listing::models::{ListingData, StructuredListingHint};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

pub const MAX_IMAGES: usize = 5;
pub const SCHEMA_ORG_PREFIX: &str = "https://schema.org/";

static LD_JSON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("og:title selector"));

static OG_DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:description"]"#).expect("og:description selector")
});

static BRAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""brand"\s*:\s*\{[^{}]*?"name"\s*:\s*"([^"]+)""#).expect("brand regex")
});

static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""price"\s*:\s*"(\d+(?:[.,]\d+)?)""#).expect("price regex")
});

static IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://images\d*\.vinted\.net/t/[^"'\s<>\\]+"#).expect("image regex")
});

/// A listing page parsed once, read by every field rule.
pub struct ListingPage<'a> {
    raw: &'a str,
    document: Html,
}

type FieldRule = fn(&ListingPage<'_>, Option<&StructuredListingHint>) -> Option<String>;

const TITLE_RULES: &[FieldRule] = &[hint_name, og_title];
const BRAND_RULES: &[FieldRule] = &[hint_brand, brand_pattern];
const PRICE_RULES: &[FieldRule] = &[hint_price, price_pattern];
const DESCRIPTION_RULES: &[FieldRule] = &[hint_description, og_description];
const CONDITION_RULES: &[FieldRule] = &[hint_condition];

impl<'a> ListingPage<'a> {
    pub fn parse(raw: &'a str) -> Self {
        Self {
            raw,
            document: Html::parse_document(raw),
        }
    }

    pub fn extract(&self, hint: Option<&StructuredListingHint>, source_url: &str) -> ListingData {
        ListingData {
            title: self.first_match(TITLE_RULES, hint),
            brand: self.first_match(BRAND_RULES, hint),
            price: self.first_match(PRICE_RULES, hint),
            description: self.first_match(DESCRIPTION_RULES, hint),
            condition: self.first_match(CONDITION_RULES, hint),
            images: self.images(),
            source_url: source_url.to_string(),
        }
    }

    /// The first `Product`-shaped ld+json block.
    ///
    /// Blocks that fail to parse are logged and skipped.
    pub fn structured_hint(&self) -> Option<StructuredListingHint> {
        for script in self.document.select(&LD_JSON) {
            let raw = script.text().collect::<String>();
            let value: Value = match serde_json::from_str(raw.trim()) {
                Ok(value) => value,
                Err(err) => {
                    warn!(target = "dealscope.extract", error = %err, "structured_data_unparseable");
                    continue;
                }
            };
            let Some(product) = product_object(&value) else {
                continue;
            };
            match serde_json::from_value::<StructuredListingHint>(product.clone()) {
                Ok(hint) => return Some(hint),
                Err(err) => {
                    warn!(target = "dealscope.extract", error = %err, "structured_data_unexpected_shape");
                }
            }
        }
        None
    }

    /// CDN image URLs in first-seen order, deduplicated, at most [`MAX_IMAGES`].
    pub fn images(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        IMAGE_RE
            .find_iter(self.raw)
            .map(|m| m.as_str().to_string())
            .filter(|url| seen.insert(url.clone()))
            .take(MAX_IMAGES)
            .collect()
    }

    fn first_match(
        &self,
        rules: &[FieldRule],
        hint: Option<&StructuredListingHint>,
    ) -> Option<String> {
        rules
            .iter()
            .find_map(|rule| rule(self, hint).and_then(non_blank))
    }

    fn meta_content(&self, selector: &Selector) -> Option<String> {
        self.document
            .select(selector)
            .find_map(|el| el.value().attr("content").map(str::to_string))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn product_object(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(product_object),
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                return product_object(graph);
            }
            is_product_type(map.get("@type")).then_some(value)
        }
        _ => None,
    }
}

// Untyped objects are accepted; an explicit non-Product type is not.
fn is_product_type(declared: Option<&Value>) -> bool {
    match declared {
        None => true,
        Some(Value::String(kind)) => kind == "Product",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("Product")),
        Some(_) => false,
    }
}

fn hint_name(_: &ListingPage<'_>, hint: Option<&StructuredListingHint>) -> Option<String> {
    hint?.name.clone()
}

fn hint_brand(_: &ListingPage<'_>, hint: Option<&StructuredListingHint>) -> Option<String> {
    hint?.brand.as_ref()?.name().map(str::to_string)
}

fn hint_price(_: &ListingPage<'_>, hint: Option<&StructuredListingHint>) -> Option<String> {
    let offer = hint?.offer()?;
    let amount = offer.amount()?;
    let symbol = match offer.priceCurrency.as_deref().map(str::trim) {
        None | Some("") | Some("EUR") => "€",
        Some(code) => code,
    };
    Some(format!("{symbol}{amount}"))
}

fn hint_description(_: &ListingPage<'_>, hint: Option<&StructuredListingHint>) -> Option<String> {
    hint?.description.clone()
}

fn hint_condition(_: &ListingPage<'_>, hint: Option<&StructuredListingHint>) -> Option<String> {
    let condition = hint?.itemCondition.as_deref()?;
    Some(
        condition
            .strip_prefix(SCHEMA_ORG_PREFIX)
            .unwrap_or(condition)
            .to_string(),
    )
}

fn og_title(page: &ListingPage<'_>, _: Option<&StructuredListingHint>) -> Option<String> {
    page.meta_content(&OG_TITLE)
}

fn og_description(page: &ListingPage<'_>, _: Option<&StructuredListingHint>) -> Option<String> {
    page.meta_content(&OG_DESCRIPTION)
}

fn brand_pattern(page: &ListingPage<'_>, _: Option<&StructuredListingHint>) -> Option<String> {
    BRAND_RE
        .captures(page.raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn price_pattern(page: &ListingPage<'_>, _: Option<&StructuredListingHint>) -> Option<String> {
    PRICE_RE
        .captures(page.raw)
        .and_then(|c| c.get(1))
        .map(|m| format!("€{}", m.as_str()))
}

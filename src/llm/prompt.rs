use crate::listing::ListingData;

const UNKNOWN: &str = "Unknown";
const NO_DESCRIPTION: &str = "No description";

const IMAGE_NOTE: &str = "\nThe first listing photo is attached. Use it to judge visible condition, materials, and any signs that the item is not authentic.\n";

/// Renders the rating instruction for one listing.
pub fn build_prompt(listing: &ListingData) -> String {
    let title = listing.title.as_deref().unwrap_or(UNKNOWN);
    let brand = listing.brand.as_deref().unwrap_or(UNKNOWN);
    let price = listing.price.as_deref().unwrap_or(UNKNOWN);
    let condition = listing.condition.as_deref().unwrap_or(UNKNOWN);
    let description = listing.description.as_deref().unwrap_or(NO_DESCRIPTION);
    let image_note = if listing.images.is_empty() {
        ""
    } else {
        IMAGE_NOTE
    };

    format!(
        r#"You are an expert in secondhand fashion resale. Rate how good a deal this listing is for a buyer.

LISTING
Title: {title}
Brand: {brand}
Price: {price}
Condition: {condition}
Description: {description}

RATING SCALE
5 - Absolute Steal: priced far below typical resale value for this item and condition.
4 - Great Deal: clearly below typical resale value.
3 - Fair Price: in line with what comparable items sell for.
2 - Slightly Overpriced: somewhat above typical resale value.
1 - Overpriced: well above typical resale value, or likely not what it claims to be.

Write a 2-4 sentence assessment that covers:
- How the price compares with the usual secondhand market price for this brand, item type and condition.
- How confident you are that the item is authentic and correctly attributed. Watch for diffusion or budget sub-lines being sold as the mainline luxury label (for example, a "Marc by Marc Jacobs" piece priced as "Marc Jacobs").
- Any quality indicators from the title, description or condition: materials, wear, missing details.
{image_note}
Respond in exactly this format and nothing else:
RATING: <number from 1 to 5>
ASSESSMENT: <your 2-4 sentence assessment>"#
    )
}

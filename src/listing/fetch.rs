use crate::http::browser_headers;
use crate::listing::extract::ListingPage;
use crate::listing::models::ListingData;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch listing")]
    Request(String),
    #[error("Failed to fetch listing")]
    Status(u16),
    #[error(
        "Could not extract listing data. The page may be protected or the URL may not be a listing."
    )]
    Extraction,
}

#[derive(Debug, Clone)]
pub struct ListingFetcher {
    http: Client,
}

impl ListingFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Downloads the listing page and extracts its fields.
    ///
    /// Fails only when the page cannot be retrieved, or when neither a title
    /// nor a price could be found.
    pub async fn fetch(&self, url: &str) -> Result<ListingData, FetchError> {
        let response = self
            .http
            .get(url)
            .headers(browser_headers())
            .send()
            .await
            .map_err(|err| {
                warn!(target = "dealscope.fetch", %url, error = %err, "listing_request_failed");
                FetchError::Request(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target = "dealscope.fetch", %url, status = status.as_u16(), "listing_http_error");
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|err| FetchError::Request(err.to_string()))?;

        // `Html` is not `Send`; the parsed page must not outlive this block.
        let (listing, structured) = {
            let page = ListingPage::parse(&html);
            let hint = page.structured_hint();
            (page.extract(hint.as_ref(), url), hint.is_some())
        };
        debug!(
            target = "dealscope.fetch",
            %url,
            bytes = html.len(),
            structured,
            images = listing.images.len(),
            "listing_extracted"
        );

        if !listing.has_minimum_data() {
            return Err(FetchError::Extraction);
        }
        Ok(listing)
    }
}

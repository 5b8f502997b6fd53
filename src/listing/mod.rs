pub mod extract;
pub mod fetch;
pub mod models;

pub use fetch::{FetchError, ListingFetcher};
pub use models::ListingData;

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::trace;

pub const REQUESTS_TOTAL: &str = "dealscope_requests_total";
pub const STAGE_ELAPSED_MS: &str = "dealscope_stage_elapsed_ms";
pub const STAGE_FAILURES_TOTAL: &str = "dealscope_stage_failures_total";
pub const RATINGS_TOTAL: &str = "dealscope_ratings_total";

/// Registers help text with whichever recorder is installed.
pub fn describe() {
    describe_counter!(REQUESTS_TOTAL, "Requests received, by route");
    describe_histogram!(STAGE_ELAPSED_MS, "Pipeline stage duration in milliseconds");
    describe_counter!(STAGE_FAILURES_TOTAL, "Pipeline stages that ended in an error");
    describe_counter!(RATINGS_TOTAL, "Ratings returned, by value");
}

pub fn inc_requests(route: &'static str) {
    counter!(REQUESTS_TOTAL, "route" => route).increment(1);
    trace!(target = "dealscope.metrics", route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!(STAGE_ELAPSED_MS, "stage" => stage).record(elapsed_ms as f64);
}

pub fn stage_failed(stage: &'static str) {
    counter!(STAGE_FAILURES_TOTAL, "stage" => stage).increment(1);
    trace!(target = "dealscope.metrics", stage, "stage_failures_total_inc");
}

pub fn rating_observed(rating: u8) {
    counter!(RATINGS_TOTAL, "rating" => rating.to_string()).increment(1);
}

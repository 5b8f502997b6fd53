use crate::analysis::{self, AnalysisResult};
use crate::config::{AppConfig, LlmConfig};
use crate::http::build_client;
use crate::listing::{FetchError, ListingData, ListingFetcher};
use crate::llm::{self, LlmClient, LlmError};
use crate::models::StageReport;
use reqwest::{Client, Url};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub const URL_REQUIRED: &str = "URL is required";
pub const URL_NOT_HTTP: &str = "URL must be an http(s) address";

/// Listing URL → fetched fields → model reply → bounded rating.
///
/// Holds no per-request state; clones share the HTTP client.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<ListingFetcher>,
    llm: Arc<LlmClient>,
}

#[derive(Debug)]
pub struct Appraisal {
    pub listing: ListingData,
    pub result: AnalysisResult,
    pub stages: Vec<StageReport>,
}

impl Pipeline {
    pub fn new(http: Client, llm_config: LlmConfig) -> Self {
        Self {
            fetcher: Arc::new(ListingFetcher::new(http.clone())),
            llm: Arc::new(LlmClient::new(http, llm_config)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(build_client(&config.http), config.llm.clone())
    }

    pub async fn run(&self, url: &str) -> Result<Appraisal, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(target: "dealscope.pipeline", "analysis", %request_id);
        self.run_stages(url).instrument(span).await
    }

    async fn run_stages(&self, url: &str) -> Result<Appraisal, PipelineError> {
        let started = Instant::now();
        let mut stages = Vec::new();

        let listing = self
            .capture_stage(
                "fetch_listing",
                &mut stages,
                stages::fetch_listing(&self.fetcher, url),
            )
            .await?;

        let prompt = self
            .capture_stage("build_prompt", &mut stages, async {
                stages::build_prompt(&listing)
            })
            .await?;

        let reply = self
            .capture_stage(
                "call_model",
                &mut stages,
                stages::call_model(&self.llm, &prompt, &listing),
            )
            .await?;

        let result = self
            .capture_stage("parse_response", &mut stages, async {
                stages::parse_response(&reply)
            })
            .await?;

        crate::metrics::rating_observed(result.rating);
        debug!(
            target = "dealscope.pipeline",
            transcript = %serde_json::to_string(&stages).unwrap_or_default(),
            "stage_transcript"
        );
        info!(
            target = "dealscope.pipeline",
            %url,
            rating = result.rating,
            label = result.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis_completed"
        );

        Ok(Appraisal {
            listing,
            result,
            stages,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = match fut.await {
            Ok(outcome) => outcome,
            Err(err) => {
                crate::metrics::stage_failed(name);
                warn!(target = "dealscope.pipeline", stage = name, kind = ?err.kind(), error = %err, "stage_failed");
                return Err(err);
            }
        };
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        debug!(target = "dealscope.pipeline", stage = name, elapsed_ms = elapsed_ms as u64, output = %outcome.output, "stage_completed");
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Checks the submitted URL before any network activity.
pub fn validate_url(raw: Option<&str>) -> Result<String, PipelineError> {
    let url = raw
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| PipelineError::invalid_input("validate", URL_REQUIRED))?;
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            Ok(url.to_string())
        }
        _ => Err(PipelineError::invalid_input("validate", URL_NOT_HTTP)),
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Fetch,
    Extraction,
    ModelConfig,
    ModelCall,
    NoAnalysis,
    Internal,
}

impl PipelineError {
    pub fn new(stage: &'static str, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::InvalidInput, message)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, PipelineErrorKind::Internal, message)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        let kind = match err {
            FetchError::Request(_) | FetchError::Status(_) => PipelineErrorKind::Fetch,
            FetchError::Extraction => PipelineErrorKind::Extraction,
        };
        Self::new("fetch_listing", kind, err.to_string())
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        let kind = match err {
            LlmError::MissingApiKey => PipelineErrorKind::ModelConfig,
            LlmError::Http(_) | LlmError::Status(_) | LlmError::InvalidResponse(_) => {
                PipelineErrorKind::ModelCall
            }
            LlmError::NoAnalysis => PipelineErrorKind::NoAnalysis,
        };
        Self::new("call_model", kind, err.to_string())
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::*;

    pub async fn fetch_listing(
        fetcher: &ListingFetcher,
        url: &str,
    ) -> Result<StageOutcome<ListingData>, PipelineError> {
        let listing = fetcher.fetch(url).await?;
        let output = json!({
            "title": listing.title,
            "brand": listing.brand,
            "price": listing.price,
            "condition": listing.condition,
            "has_description": listing.description.is_some(),
            "images": listing.images.len(),
        });
        Ok(StageOutcome::new(listing, output))
    }

    pub fn build_prompt(listing: &ListingData) -> Result<StageOutcome<String>, PipelineError> {
        let prompt = llm::build_prompt(listing);
        let output = json!({
            "chars": prompt.chars().count(),
            "with_image": !listing.images.is_empty(),
        });
        Ok(StageOutcome::new(prompt, output))
    }

    pub async fn call_model(
        llm: &LlmClient,
        prompt: &str,
        listing: &ListingData,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let reply = llm.analyze(prompt, listing).await?;
        let output = json!({
            "model": llm.model(),
            "chars": reply.chars().count(),
        });
        Ok(StageOutcome::new(reply, output))
    }

    pub fn parse_response(reply: &str) -> Result<StageOutcome<AnalysisResult>, PipelineError> {
        let result = analysis::parse_reply(reply);
        let output = json!({
            "rating": result.rating,
            "label": result.label(),
        });
        Ok(StageOutcome::new(result, output))
    }
}

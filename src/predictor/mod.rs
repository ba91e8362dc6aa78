//! Category prediction and feedback clients.
//!
//! Both services are best-effort: failures are logged and never reach the
//! user as errors.

pub mod feedback;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Category;

pub use feedback::{CategoryFeedback, FeedbackReporter, FeedbackService, HttpFeedbackSink};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictionResponse {
    /// Either a category slug or a catalogue index, as a number or string.
    pub category: Value,
    #[serde(default)]
    pub category_id: Option<i64>,
    pub confidence: f64,
    #[serde(default)]
    pub probabilities: Option<HashMap<String, f64>>,
}

impl PredictionResponse {
    pub fn resolve_category(&self) -> Category {
        match &self.category {
            Value::Number(number) => number
                .as_i64()
                .map(Category::from_index)
                .unwrap_or(Category::Other),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(Category::from_index)
                .or_else(|_| text.parse::<Category>())
                .unwrap_or(Category::Other),
            _ => self
                .category_id
                .map(Category::from_index)
                .unwrap_or(Category::Other),
        }
    }
}

pub trait PredictionService: Send + Sync {
    fn predict<'a>(&'a self, request: &'a PredictionRequest) -> BoxFuture<'a, Result<PredictionResponse>>;
}

pub struct HttpPredictor {
    client: reqwest::Client,
    url: String,
}

impl HttpPredictor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }
}

impl PredictionService for HttpPredictor {
    fn predict<'a>(&'a self, request: &'a PredictionRequest) -> BoxFuture<'a, Result<PredictionResponse>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(request)
                .send()
                .await
                .with_context(|| format!("prediction request to {} failed", self.url))?
                .error_for_status()
                .context("prediction service returned an error status")?;

            response
                .json::<PredictionResponse>()
                .await
                .context("failed to parse prediction response")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suggestion {
    pub category: Category,
    pub confidence: f64,
}

impl Suggestion {
    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// Turns predictor output into an applicable suggestion.
#[derive(Clone)]
pub struct CategorySuggester {
    service: Arc<dyn PredictionService>,
    threshold: f64,
}

impl CategorySuggester {
    pub fn new(service: Arc<dyn PredictionService>, threshold: f64) -> Self {
        Self { service, threshold }
    }

    /// `None` when the draft is too short, the call fails, or confidence
    /// is not above the threshold.
    pub async fn suggest(&self, title: &str, description: &str) -> Option<Suggestion> {
        if !should_predict(title, description) {
            return None;
        }

        let request = PredictionRequest {
            title: title.trim().to_string(),
            description: description.trim().to_string(),
        };

        let response = match self.service.predict(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Category prediction failed: {err:#}");
                return None;
            }
        };

        let category = response.resolve_category();
        debug!(
            "Predicted {category} with confidence {:.2}",
            response.confidence
        );
        (response.confidence > self.threshold).then_some(Suggestion {
            category,
            confidence: response.confidence,
        })
    }
}

/// Title longer than 3 characters and description longer than 10.
pub fn should_predict(title: &str, description: &str) -> bool {
    title.trim().chars().count() > 3 && description.trim().chars().count() > 10
}

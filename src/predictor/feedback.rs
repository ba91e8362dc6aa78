use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::models::Category;

use super::BoxFuture;

/// Whether the user kept the suggested category.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryFeedback {
    pub title: String,
    pub description: String,
    pub predicted_category: String,
    pub actual_category: String,
    pub accepted: bool,
}

impl CategoryFeedback {
    pub fn new(title: &str, description: &str, predicted: Category, actual: Category) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            predicted_category: predicted.as_str().to_string(),
            actual_category: actual.as_str().to_string(),
            accepted: predicted == actual,
        }
    }
}

pub trait FeedbackService: Send + Sync {
    fn submit<'a>(&'a self, feedback: &'a CategoryFeedback) -> BoxFuture<'a, Result<()>>;
}

pub struct HttpFeedbackSink {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedbackSink {
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

impl FeedbackService for HttpFeedbackSink {
    fn submit<'a>(&'a self, feedback: &'a CategoryFeedback) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.client
                .post(&self.url)
                .json(feedback)
                .send()
                .await
                .with_context(|| format!("feedback request to {} failed", self.url))?
                .error_for_status()
                .context("feedback sink returned an error status")?;
            Ok(())
        })
    }
}

/// Fire-and-forget wrapper around a [`FeedbackService`].
#[derive(Clone)]
pub struct FeedbackReporter {
    service: Arc<dyn FeedbackService>,
}

impl FeedbackReporter {
    pub fn new(service: Arc<dyn FeedbackService>) -> Self {
        Self { service }
    }

    /// Submits on a spawned task; the handle is only for tests to await.
    pub fn report(&self, feedback: CategoryFeedback) -> JoinHandle<()> {
        let service = self.service.clone();
        tokio::spawn(async move {
            match service.submit(&feedback).await {
                Ok(()) => debug!(
                    "Feedback sent ({} -> {}, accepted: {})",
                    feedback.predicted_category, feedback.actual_category, feedback.accepted
                ),
                Err(err) => warn!("Feedback submission failed: {err:#}"),
            }
        })
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::QuizConfig;
use crate::models::quiz::{Quiz, Verdict};

use super::quiz_generator::GeneratedQuizService;

/// Quiz content and answer judging. Both calls may be slow; judging may reject.
#[async_trait]
pub trait QuizService: Send + Sync {
    async fn fetch_quiz(&self) -> Result<Quiz>;

    /// Never fails outright: anything other than acceptance is a rejection to replay.
    async fn judge(&self, question_id: &str, answer_index: u32) -> Verdict;
}

pub fn quiz_service_from_config(config: &QuizConfig) -> Arc<dyn QuizService> {
    match &config.api_url {
        Some(api_url) => {
            tracing::info!("Using remote quiz service at {}", api_url);
            Arc::new(HttpQuizService::new(api_url.clone()))
        }
        None => {
            tracing::info!(
                "Using built-in quiz generator ({} questions, rejection rate {})",
                config.question_count,
                config.rejection_rate
            );
            Arc::new(GeneratedQuizService::new(config.clone()))
        }
    }
}

#[derive(Debug, Serialize)]
struct JudgeRequest {
    answer_index: u32,
}

pub struct HttpQuizService {
    http_client: Client,
    api_url: String,
}

impl HttpQuizService {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QuizService for HttpQuizService {
    async fn fetch_quiz(&self) -> Result<Quiz> {
        let url = format!("{}/quiz", self.api_url);

        let quiz = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach quiz service at {}", url))?
            .error_for_status()
            .context("Quiz service returned an error status")?
            .json::<Quiz>()
            .await
            .context("Failed to parse quiz payload")?;

        Ok(quiz)
    }

    async fn judge(&self, question_id: &str, answer_index: u32) -> Verdict {
        let url = format!("{}/questions/{}/answers", self.api_url, question_id);

        let result = self
            .http_client
            .post(&url)
            .json(&JudgeRequest { answer_index })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => Verdict::Accepted,
            Ok(response) => {
                tracing::warn!(
                    "Judge answered {} for {}/{}",
                    response.status(),
                    question_id,
                    answer_index
                );
                Verdict::Rejected {
                    question_id: question_id.to_string(),
                    answer_index,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Judge unreachable for {}/{}", question_id, answer_index);
                Verdict::Rejected {
                    question_id: question_id.to_string(),
                    answer_index,
                }
            }
        }
    }
}

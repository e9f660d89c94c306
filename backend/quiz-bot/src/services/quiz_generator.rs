//! Built-in quiz source used when no remote service is configured.
//!
//! Generates pseudo-random quizzes and judges answers with random latency and
//! a configurable rejection rate, so the replay path gets exercised in
//! ordinary play.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::QuizConfig;
use crate::models::quiz::{Answer, Question, Quiz, Verdict};

use super::quiz_service::QuizService;

const QUIZ_ID_LEN: usize = 8;
const QUESTION_ID_LEN: usize = 9;
const MAX_QUESTION_WORDS: usize = 30;
const MAX_ANSWER_WORDS: usize = 20;
const MAX_WORD_LEN: usize = 9;

pub struct GeneratedQuizService {
    config: QuizConfig,
}

impl GeneratedQuizService {
    pub fn new(config: QuizConfig) -> Self {
        Self { config }
    }

    pub fn generate_quiz<R: Rng + ?Sized>(&self, rng: &mut R) -> Quiz {
        Quiz {
            id: random_id(rng, QUIZ_ID_LEN),
            questions: (0..self.config.question_count)
                .map(|_| self.generate_question(rng))
                .collect(),
        }
    }

    fn generate_question<R: Rng + ?Sized>(&self, rng: &mut R) -> Question {
        let mut answers: Vec<Answer> = (0..self.config.answer_count)
            .map(|index| Answer {
                index,
                text: pseudo_sentence(rng, MAX_ANSWER_WORDS),
            })
            .collect();
        answers.shuffle(rng);

        Question {
            id: random_id(rng, QUESTION_ID_LEN),
            text: format!("{}?", pseudo_sentence(rng, MAX_QUESTION_WORDS)),
            answers,
        }
    }

    fn latency<R: Rng + ?Sized>(rng: &mut R, max_ms: u64) -> Duration {
        Duration::from_millis(rng.random_range(0..=max_ms))
    }
}

#[async_trait]
impl QuizService for GeneratedQuizService {
    async fn fetch_quiz(&self) -> Result<Quiz> {
        let (quiz, latency) = {
            let mut rng = rand::rng();
            (
                self.generate_quiz(&mut rng),
                Self::latency(&mut rng, self.config.fetch_latency_max_ms),
            )
        };

        tokio::time::sleep(latency).await;
        tracing::debug!("Generated quiz {} after {}ms", quiz.id, latency.as_millis());
        Ok(quiz)
    }

    async fn judge(&self, question_id: &str, answer_index: u32) -> Verdict {
        let (rejected, latency) = {
            let mut rng = rand::rng();
            (
                rng.random_bool(self.config.rejection_rate.clamp(0.0, 1.0)),
                Self::latency(&mut rng, self.config.judge_latency_max_ms),
            )
        };

        tokio::time::sleep(latency).await;
        if rejected {
            Verdict::Rejected {
                question_id: question_id.to_string(),
                answer_index,
            }
        } else {
            Verdict::Accepted
        }
    }
}

fn random_id<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

fn pseudo_sentence<R: Rng + ?Sized>(rng: &mut R, max_words: usize) -> String {
    let words = rng.random_range(1..=max_words);
    (0..words)
        .map(|_| {
            let len = rng.random_range(1..=MAX_WORD_LEN);
            (0..len)
                .map(|_| char::from(rng.random_range(b'a'..=b'z')))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

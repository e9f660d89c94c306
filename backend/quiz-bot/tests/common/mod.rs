#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use quiz_bot::{
    config::Config,
    models::{
        exchange::{
            ActionTag, EntryPayload, ExchangeEntry, Origin, Position, Selection, SubmitOutcome,
        },
        quiz::{Answer, Question, QuestionId, Quiz, Verdict},
        session::SessionSnapshot,
    },
    services::{quiz_service::QuizService, AppState},
};

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.bot.typing_delay_ms = 0;
    config.bot.startup_delay_ms = 0;
    config.bot.welcome_image = String::new();
    config
}

pub fn quiz_with(count: usize) -> Quiz {
    Quiz {
        id: "testquiz".to_string(),
        questions: (1..=count)
            .map(|n| Question {
                id: format!("q{}", n),
                text: format!("Question number {}?", n),
                // correct answer deliberately not first on screen
                answers: vec![
                    Answer {
                        index: 2,
                        text: "maybe".to_string(),
                    },
                    Answer {
                        index: 0,
                        text: "right".to_string(),
                    },
                    Answer {
                        index: 1,
                        text: "wrong".to_string(),
                    },
                ],
            })
            .collect(),
    }
}

/// A judge call held open until the test settles it.
pub struct PendingJudgement {
    pub question_id: QuestionId,
    pub answer_index: u32,
    reply: oneshot::Sender<Verdict>,
}

impl PendingJudgement {
    pub fn accept(self) {
        let _ = self.reply.send(Verdict::Accepted);
    }

    pub fn reject(self) {
        let verdict = Verdict::Rejected {
            question_id: self.question_id.clone(),
            answer_index: self.answer_index,
        };
        let _ = self.reply.send(verdict);
    }
}

/// Quiz service whose judge calls are settled by the test, in any order.
pub struct ScriptedQuizService {
    quiz: Quiz,
    failing_fetches: AtomicUsize,
    fetches: AtomicUsize,
    judgements: mpsc::UnboundedSender<PendingJudgement>,
}

impl ScriptedQuizService {
    pub fn new(quiz: Quiz) -> (Self, mpsc::UnboundedReceiver<PendingJudgement>) {
        let (judgements, rx) = mpsc::unbounded_channel();
        (
            Self {
                quiz,
                failing_fetches: AtomicUsize::new(0),
                fetches: AtomicUsize::new(0),
                judgements,
            },
            rx,
        )
    }

    pub fn failing_first(self, failures: usize) -> Self {
        self.failing_fetches.store(failures, Ordering::SeqCst);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuizService for ScriptedQuizService {
    async fn fetch_quiz(&self) -> Result<Quiz> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(anyhow!("quiz service unavailable"));
        }
        Ok(self.quiz.clone())
    }

    async fn judge(&self, question_id: &str, answer_index: u32) -> Verdict {
        let (reply, rx) = oneshot::channel();
        let pending = PendingJudgement {
            question_id: question_id.to_string(),
            answer_index,
            reply,
        };
        if self.judgements.send(pending).is_err() {
            return Verdict::Accepted;
        }
        rx.await.unwrap_or(Verdict::Accepted)
    }
}

/// One running bot session plus the handles a test needs to drive it.
pub struct BotHarness {
    pub state: Arc<AppState>,
    pub service: Arc<ScriptedQuizService>,
    judgements: mpsc::UnboundedReceiver<PendingJudgement>,
    runner: JoinHandle<()>,
    next_prompt_from: Position,
}

impl BotHarness {
    pub fn start(quiz: Quiz) -> Self {
        let (service, judgements) = ScriptedQuizService::new(quiz);
        Self::start_with(service, judgements)
    }

    pub fn start_with(
        service: ScriptedQuizService,
        judgements: mpsc::UnboundedReceiver<PendingJudgement>,
    ) -> Self {
        init_tracing();
        let service = Arc::new(service);
        let (state, runner) = AppState::bootstrap(test_config(), service.clone());
        let runner = tokio::spawn(runner.run());

        Self {
            state: Arc::new(state),
            service,
            judgements,
            runner,
            next_prompt_from: 0,
        }
    }

    /// Waits for the next prompt the bot opens.
    pub async fn next_prompt(&mut self) -> ExchangeEntry {
        let from = self.next_prompt_from;
        let exchange = self.state.exchange.clone();
        let entry = wait_until(|| {
            exchange
                .open_prompts()
                .into_iter()
                .find(|position| *position >= from)
                .and_then(|position| exchange.entry(position))
        })
        .await;
        self.next_prompt_from = entry.position + 1;
        entry
    }

    pub async fn choose(&mut self, action: usize) -> ExchangeEntry {
        let prompt = self.next_prompt().await;
        self.select(&prompt, action);
        prompt
    }

    pub fn select(&self, prompt: &ExchangeEntry, action: usize) {
        let outcome = self
            .state
            .exchange
            .submit_choice(prompt.position, Selection::Action(action));
        assert_eq!(outcome, SubmitOutcome::Consumed);
    }

    /// Answers the question on screen; returns its id.
    pub async fn answer(&mut self, correct: bool) -> QuestionId {
        let prompt = self.next_prompt().await;
        let EntryPayload::ActionPrompt { actions, .. } = &prompt.payload else {
            panic!("expected an action prompt, got {:?}", prompt.payload);
        };

        let (choice, question_id) = actions
            .iter()
            .enumerate()
            .find_map(|(i, action)| match &action.tag {
                ActionTag::Answer {
                    question_id,
                    answer_index,
                } if (*answer_index == 0) == correct => Some((i, question_id.clone())),
                _ => None,
            })
            .expect("question prompt without a matching answer");

        self.select(&prompt, choice);
        question_id
    }

    pub async fn next_judgement(&mut self) -> PendingJudgement {
        tokio::time::timeout(WAIT_LIMIT, self.judgements.recv())
            .await
            .expect("timed out waiting for a judge call")
            .expect("judge channel closed")
    }

    pub async fn wait_for_session<F>(&self, check: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        let mut session = self.state.session.clone();
        let snapshot = tokio::time::timeout(WAIT_LIMIT, session.wait_for(|s| check(s)))
            .await
            .expect("timed out waiting for session state")
            .expect("runner stopped");
        snapshot.clone()
    }

    pub async fn wait_for_text(&self, text: &str) -> Position {
        let exchange = self.state.exchange.clone();
        wait_until(|| {
            exchange
                .snapshot()
                .into_iter()
                .find(|entry| entry.payload.text() == Some(text))
                .map(|entry| entry.position)
        })
        .await
    }

    /// Visible bot message texts, in log order.
    pub fn bot_texts(&self) -> Vec<String> {
        self.state
            .exchange
            .snapshot()
            .into_iter()
            .filter(|entry| entry.origin == Origin::Bot && entry.is_visible())
            .filter(|entry| !entry.payload.is_prompt())
            .filter_map(|entry| entry.payload.text().map(str::to_string))
            .collect()
    }

    pub fn count_text(&self, text: &str) -> usize {
        self.bot_texts().iter().filter(|t| t.as_str() == text).count()
    }

    /// Question ids in the order the bot presented them.
    pub fn presented_questions(&self) -> Vec<QuestionId> {
        self.bot_texts()
            .iter()
            .filter_map(|text| {
                let (_, rest) = text.split_once("[Question: ")?;
                rest.strip_suffix(']').map(str::to_string)
            })
            .collect()
    }
}

impl Drop for BotHarness {
    fn drop(&mut self) {
        self.runner.abort();
    }
}

pub async fn wait_until<T, F>(mut probe: F) -> T
where
    F: FnMut() -> Option<T>,
{
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("timed out waiting for the bot")
}

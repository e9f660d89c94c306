//! Quiz runner - decides what the bot says next.
//!
//! The runner is a single task draining one event queue. Routed choices and
//! judge settlements land on the same queue, so each is handled to
//! completion before the next one starts and the session state needs no
//! lock. Prompts are posted, not awaited: the queue keeps draining while a
//! question is on screen. Judge calls run as their own tasks and only report
//! back through the queue.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::config::BotConfig;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, GAMES_COMPLETED_TOTAL, QUIZZES_STARTED_TOTAL, REPLAYS_TOTAL,
    SUBMISSIONS_IN_FLIGHT, SUBMISSIONS_SETTLED_TOTAL,
};
use crate::models::exchange::{
    Action, ActionTag, ChoiceEvent, EntryPayload, FeedbackCue, PromptState,
};
use crate::models::quiz::{Question, QuestionId, Verdict};
use crate::models::session::{
    AfterSettlement, Feedback, NextStep, SessionSnapshot, SessionState, Settled, Summary,
};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

use super::exchange_log::{ChoiceRouter, ExchangeLog};
use super::quiz_service::QuizService;

pub const GREETING: &str = "I am Tasst, your bot! Enough talking, let's take a quiz? 👌🏻👏🏻";
pub const ACKNOWLEDGEMENT: &str = "Sure, let's do it!";
pub const FETCH_TYPING: &str = "Ok, here we go.";
pub const CLOSING_TYPING: &str = "😉";
pub const CORRECT_FEEDBACK: &str = "THAT'S RIGHT! ✅👍🏻";
pub const WRONG_FEEDBACK: &str = "OOPS, THAT'S WRONG! 🚨👎🏻";
pub const PLAY_AGAIN: &str = "Let's play again?";
pub const FETCH_FAILED: &str = "Hmm, I couldn't get a quiz right now. Try again?";

pub fn summary_message(summary: &Summary) -> String {
    format!(
        "You must keep going, you must keep pushing forward.....{} of {}! 👍🏻👌🏻",
        summary.correct, summary.total
    )
}

pub fn question_message(question: &Question) -> String {
    format!("{} [Question: {}]", question.text, question.id)
}

#[derive(Debug)]
pub enum RunnerEvent {
    Choice(ChoiceEvent),
    Settled {
        question_id: QuestionId,
        verdict: Verdict,
    },
}

impl ChoiceRouter for mpsc::UnboundedSender<RunnerEvent> {
    fn route(&self, choice: ChoiceEvent) {
        if self.send(RunnerEvent::Choice(choice)).is_err() {
            tracing::debug!("Quiz runner stopped; dropping routed choice");
        }
    }
}

pub struct QuizRunner {
    log: ExchangeLog,
    quiz_service: Arc<dyn QuizService>,
    settings: BotConfig,
    session: SessionState,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    status_tx: watch::Sender<SessionSnapshot>,
}

impl QuizRunner {
    pub fn new(log: ExchangeLog, quiz_service: Arc<dyn QuizService>, settings: BotConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        log.route_choices_to(Arc::new(events_tx.clone()));
        let (status_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            log,
            quiz_service,
            settings,
            session: SessionState::new(),
            events_tx,
            events_rx,
            status_tx,
        }
    }

    pub fn status(&self) -> watch::Receiver<SessionSnapshot> {
        self.status_tx.subscribe()
    }

    /// Plays the opening script, then serves events until the process stops.
    pub async fn run(mut self) {
        sleep(self.settings.startup_delay()).await;
        if !self.settings.welcome_image.is_empty() {
            let image = self.settings.welcome_image.clone();
            self.log.say_with_image(" ", image).await;
        }
        self.start_bot().await;

        while let Some(event) = self.events_rx.recv().await {
            self.handle(event).await;
            self.publish_status();
        }
    }

    async fn handle(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Choice(choice) => self.on_choice(choice).await,
            RunnerEvent::Settled {
                question_id,
                verdict,
            } => self.on_settled(question_id, verdict).await,
        }
    }

    async fn on_choice(&mut self, choice: ChoiceEvent) {
        match choice.action.map(|action| action.tag) {
            Some(ActionTag::StartQuiz) => self.start_quiz().await,
            Some(ActionTag::Answer {
                question_id,
                answer_index,
            }) => self.on_answer(question_id, answer_index).await,
            None => self.start_bot().await,
        }
    }

    async fn start_bot(&mut self) {
        self.log.say(GREETING).await;
        self.prompt(EntryPayload::actions(
            PromptState::Welcome,
            vec![Action::start_quiz()],
        ));
    }

    async fn start_quiz(&mut self) {
        if self.session.is_active() {
            tracing::debug!("Quiz already running; ignoring start request");
            return;
        }

        self.log.cue(FeedbackCue::Action);
        self.log.say(ACKNOWLEDGEMENT).await;

        let typing = self.log.begin_typing(FETCH_TYPING);
        let fetched = retry_async_with_config(RetryConfig::quiz_fetch(), "Quiz fetch", || async {
            self.quiz_service.fetch_quiz().await
        })
        .await;
        self.log.end_typing(typing);

        match fetched {
            Ok(quiz) => {
                tracing::info!("Quiz {} fetched with {} questions", quiz.id, quiz.len());
                QUIZZES_STARTED_TOTAL.inc();
                self.session.load(quiz);
                let step = self.session.next_question();
                self.advance(step).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Giving up on quiz fetch");
                self.log.say(FETCH_FAILED).await;
                self.prompt(EntryPayload::actions(
                    PromptState::PlayAgain,
                    vec![Action::start_quiz()],
                ));
            }
        }
    }

    async fn on_answer(&mut self, question_id: QuestionId, answer_index: u32) {
        let Some(feedback) = self.session.record_answer(&question_id, answer_index) else {
            tracing::debug!("Ignoring answer for {} outside a running quiz", question_id);
            return;
        };

        // local feedback first; the judge's verdict never changes it
        match feedback {
            Feedback::Correct => {
                self.log.cue(FeedbackCue::Action);
                self.log.say(CORRECT_FEEDBACK).await;
                let score = self.session.score();
                tracing::debug!("Score now {} of {}", score.correct, score.total);
            }
            Feedback::Incorrect => {
                self.log.cue(FeedbackCue::Error);
                self.log.say(WRONG_FEEDBACK).await;
            }
        }
        let correct_label = if feedback == Feedback::Correct {
            "true"
        } else {
            "false"
        };
        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[correct_label])
            .inc();

        self.submit(question_id, answer_index);

        let step = self.session.next_after_answer();
        self.advance(step).await;
    }

    fn submit(&mut self, question_id: QuestionId, answer_index: u32) {
        if !self.session.begin_submission(&question_id) {
            tracing::warn!("Question {} already had a submission in flight", question_id);
        }
        SUBMISSIONS_IN_FLIGHT.inc();

        let quiz_service = self.quiz_service.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let verdict = quiz_service.judge(&question_id, answer_index).await;
            if events
                .send(RunnerEvent::Settled {
                    question_id,
                    verdict,
                })
                .is_err()
            {
                tracing::debug!("Quiz runner stopped before settlement arrived");
            }
        });
    }

    async fn on_settled(&mut self, question_id: QuestionId, verdict: Verdict) {
        SUBMISSIONS_IN_FLIGHT.dec();
        SUBMISSIONS_SETTLED_TOTAL
            .with_label_values(&[verdict.label()])
            .inc();

        match &verdict {
            Verdict::Accepted => tracing::debug!("Submission for {} accepted", question_id),
            Verdict::Rejected {
                question_id,
                answer_index,
            } => tracing::warn!(
                "Judge rejected {}/{}; question goes to the replay backlog",
                question_id,
                answer_index
            ),
        }

        let settled = self.session.settle(&question_id, &verdict);
        self.apply(settled).await;
    }

    async fn advance(&mut self, step: NextStep) {
        match step {
            NextStep::Present { question, replay } => {
                if replay {
                    REPLAYS_TOTAL.inc();
                    tracing::info!("Replaying question {}", question.id);
                }
                self.play_question(&question).await;
            }
            NextStep::BeginClosing => {
                let position = self.log.begin_typing(CLOSING_TYPING);
                self.session.set_closing_indicator(position);
                // nothing may be in flight at all (empty quiz)
                let settled = self.session.check_game_over();
                self.apply(settled).await;
            }
            NextStep::Hold => {
                tracing::debug!("Closing indicator already up");
                let settled = self.session.check_game_over();
                self.apply(settled).await;
            }
            NextStep::Idle => tracing::debug!("No quiz running; nothing to present"),
        }
    }

    async fn apply(&mut self, settled: Settled) {
        if let Some(position) = settled.end_indicator {
            self.log.end_typing(position);
        }

        match settled.next {
            AfterSettlement::Waiting => {}
            AfterSettlement::Replay(question) => {
                REPLAYS_TOTAL.inc();
                tracing::info!("Replaying question {}", question.id);
                self.play_question(&question).await;
            }
            AfterSettlement::GameOver(summary) => self.game_over(summary).await,
        }
    }

    async fn play_question(&mut self, question: &Question) {
        self.log.say(question_message(question)).await;

        let actions = question
            .answers
            .iter()
            .map(|answer| Action::answer(&question.id, answer))
            .collect();
        self.prompt(EntryPayload::actions(PromptState::Answer, actions));
    }

    async fn game_over(&mut self, summary: Summary) {
        tracing::info!("-- GAME OVER -- {} of {}", summary.correct, summary.total);
        GAMES_COMPLETED_TOTAL.inc();
        self.publish_status();

        let image = self.settings.game_over_image.clone();
        self.log.say_with_image(" ", image).await;
        self.log.say(summary_message(&summary)).await;
        self.log.say(PLAY_AGAIN).await;
        self.prompt(EntryPayload::actions(
            PromptState::PlayAgain,
            vec![Action::start_quiz()],
        ));
    }

    /// Puts a prompt on screen and returns; its routed choice comes back
    /// through the event queue.
    fn prompt(&self, payload: EntryPayload) {
        self.publish_status();
        let prompt = self.log.open_prompt(payload);
        tracing::debug!("Prompt {} open", prompt.position);
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.session.snapshot());
    }
}

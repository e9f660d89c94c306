//! Quiz session state and its transition rules.
//!
//! The runner owns one `SessionState` and asks it what to do next; the state
//! never touches the exchange log itself. Every transition is guarded so a
//! late or unexpected event (a settlement with no quiz loaded, an answer for a
//! question that is not on screen) degrades to a no-op.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use super::exchange::Position;
use super::quiz::{Question, QuestionId, Quiz, Verdict, CORRECT_ANSWER_INDEX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum Cursor {
    #[default]
    NotStarted,
    At(usize),
}

impl Cursor {
    fn step(self) -> Self {
        match self {
            Cursor::NotStarted => Cursor::At(0),
            Cursor::At(index) => Cursor::At(index.saturating_add(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Present { question: Question, replay: bool },
    /// Cursor ran past the last question; show the closing typing indicator.
    BeginClosing,
    /// Closing indicator already up; wait for outstanding settlements.
    Hold,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterSettlement {
    Waiting,
    Replay(Question),
    GameOver(Summary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub end_indicator: Option<Position>,
    pub next: AfterSettlement,
}

impl Settled {
    fn waiting() -> Self {
        Self {
            end_indicator: None,
            next: AfterSettlement::Waiting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
struct Scoreboard {
    correct: HashSet<QuestionId>,
    total: usize,
}

/// Read-only view of the session published after every runner step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub quiz_id: Option<String>,
    pub cursor: Cursor,
    pub in_flight: Vec<QuestionId>,
    pub replay_backlog: Vec<QuestionId>,
    pub awaiting: Option<QuestionId>,
    pub correct: usize,
    pub total: usize,
    pub last_summary: Option<Summary>,
}

#[derive(Debug, Default)]
pub struct SessionState {
    quiz: Option<Quiz>,
    cursor: Cursor,
    in_flight: HashSet<QuestionId>,
    replay_backlog: VecDeque<QuestionId>,
    results: Scoreboard,
    closing_indicator: Option<Position>,
    awaiting: Option<QuestionId>,
    last_summary: Option<Summary>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.quiz.is_some()
    }

    pub fn load(&mut self, quiz: Quiz) {
        self.results = Scoreboard {
            correct: HashSet::new(),
            total: quiz.len(),
        };
        self.cursor = Cursor::NotStarted;
        self.in_flight.clear();
        self.replay_backlog.clear();
        self.closing_indicator = None;
        self.awaiting = None;
        self.quiz = Some(quiz);
    }

    /// Sequential advance by cursor.
    pub fn next_question(&mut self) -> NextStep {
        let Some(quiz) = &self.quiz else {
            return NextStep::Idle;
        };

        self.cursor = self.cursor.step();
        if let Cursor::At(index) = self.cursor {
            if let Some(question) = quiz.questions.get(index) {
                self.awaiting = Some(question.id.clone());
                return NextStep::Present {
                    question: question.clone(),
                    replay: false,
                };
            }
        }

        if self.closing_indicator.is_none() {
            NextStep::BeginClosing
        } else {
            NextStep::Hold
        }
    }

    /// Replay beats sequential advance whenever the backlog has something.
    pub fn next_after_answer(&mut self) -> NextStep {
        match self.take_replay() {
            Some(question) => NextStep::Present {
                question,
                replay: true,
            },
            None => self.next_question(),
        }
    }

    pub fn set_closing_indicator(&mut self, position: Position) {
        self.closing_indicator = Some(position);
    }

    /// Local, optimistic scoring. Returns `None` when no quiz is running.
    pub fn record_answer(&mut self, question_id: &str, answer_index: u32) -> Option<Feedback> {
        let quiz = self.quiz.as_ref()?;
        quiz.question(question_id)?;

        if self.awaiting.as_deref() == Some(question_id) {
            self.awaiting = None;
        }

        if answer_index == CORRECT_ANSWER_INDEX {
            self.results.correct.insert(question_id.to_string());
            Some(Feedback::Correct)
        } else {
            Some(Feedback::Incorrect)
        }
    }

    /// Returns false when the question already had a submission in flight.
    pub fn begin_submission(&mut self, question_id: &str) -> bool {
        self.in_flight.insert(question_id.to_string())
    }

    pub fn settle(&mut self, question_id: &str, verdict: &Verdict) -> Settled {
        if self.quiz.is_none() || !self.in_flight.remove(question_id) {
            tracing::debug!("Ignoring settlement for {} outside the session", question_id);
            return Settled::waiting();
        }

        if let Verdict::Rejected { .. } = verdict {
            self.replay_backlog.push_back(question_id.to_string());
        }

        self.check_game_over()
    }

    /// Game over needs an exhausted cursor, nothing in flight, and no question on screen.
    /// A non-empty backlog at that point turns into a replay instead.
    pub fn check_game_over(&mut self) -> Settled {
        if !self.in_flight.is_empty() || self.awaiting.is_some() || !self.cursor_exhausted() {
            return Settled::waiting();
        }

        let end_indicator = self.closing_indicator.take();
        let next = match self.take_replay() {
            Some(question) => AfterSettlement::Replay(question),
            None => AfterSettlement::GameOver(self.finish()),
        };

        Settled {
            end_indicator,
            next,
        }
    }

    pub fn cursor_exhausted(&self) -> bool {
        match (&self.quiz, self.cursor) {
            (Some(quiz), Cursor::At(index)) => index >= quiz.len(),
            _ => false,
        }
    }

    pub fn score(&self) -> Summary {
        Summary {
            correct: self.results.correct.len(),
            total: self.results.total,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut in_flight: Vec<QuestionId> = self.in_flight.iter().cloned().collect();
        in_flight.sort();

        SessionSnapshot {
            quiz_id: self.quiz.as_ref().map(|q| q.id.clone()),
            cursor: self.cursor,
            in_flight,
            replay_backlog: self.replay_backlog.iter().cloned().collect(),
            awaiting: self.awaiting.clone(),
            correct: self.results.correct.len(),
            total: self.results.total,
            last_summary: self.last_summary,
        }
    }

    fn take_replay(&mut self) -> Option<Question> {
        let quiz = self.quiz.as_ref()?;
        while let Some(question_id) = self.replay_backlog.pop_front() {
            match quiz.question(&question_id) {
                Some(question) => {
                    self.awaiting = Some(question_id);
                    return Some(question.clone());
                }
                None => tracing::warn!("Replay backlog held unknown question {}", question_id),
            }
        }
        None
    }

    fn finish(&mut self) -> Summary {
        let summary = self.score();
        *self = Self {
            last_summary: Some(summary),
            ..Self::default()
        };
        summary
    }
}

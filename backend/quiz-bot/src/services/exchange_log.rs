//! Exchange log - the bot side of the conversation.
//!
//! An append-only list of entries plus one single-shot waiter per open
//! prompt. Message appends resolve after the typing delay; prompt appends
//! resolve when the presentation layer submits a choice for them. Answered
//! prompts are soft-deleted (`retracted`) so every stored position stays
//! valid for the continuations that still hold it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tokio::time::sleep;

use crate::metrics::EXCHANGE_ENTRIES_TOTAL;
use crate::models::exchange::{
    ChoiceEvent, EntryPayload, ExchangeEntry, FeedbackCue, LogEvent, Origin, Position,
    Selection, SubmitOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("prompt at position {0} was dropped before a choice arrived")]
    PromptAbandoned(Position),
}

/// Receives the routed copy of every consumed choice.
pub trait ChoiceRouter: Send + Sync {
    fn route(&self, choice: ChoiceEvent);
}

/// Presentation-layer hook: scrolling, sounds, live streaming.
pub trait ExchangeObserver: Send + Sync {
    fn on_event(&self, event: &LogEvent);
}

#[derive(Debug)]
pub enum Appended {
    Shown(Position),
    Chosen(ChoiceEvent),
}

/// A prompt on screen. Await [`OpenPrompt::choice`] for the answer, or drop
/// it and rely on the routed copy; the prompt stays open either way.
#[derive(Debug)]
pub struct OpenPrompt {
    pub position: Position,
    reply: oneshot::Receiver<ChoiceEvent>,
}

impl OpenPrompt {
    pub async fn choice(self) -> Result<ChoiceEvent, ExchangeError> {
        let OpenPrompt { position, reply } = self;
        reply
            .await
            .map_err(|_| ExchangeError::PromptAbandoned(position))
    }
}

#[derive(Default)]
struct LogInner {
    entries: Vec<ExchangeEntry>,
    waiters: HashMap<Position, oneshot::Sender<ChoiceEvent>>,
    observers: Vec<Arc<dyn ExchangeObserver>>,
    router: Option<Arc<dyn ChoiceRouter>>,
}

impl LogInner {
    fn push_entry(
        &mut self,
        origin: Origin,
        payload: EntryPayload,
        pending: bool,
    ) -> ExchangeEntry {
        let entry = ExchangeEntry {
            position: self.entries.len(),
            origin,
            payload,
            pending,
            retracted: false,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
    }
}

#[derive(Clone)]
pub struct ExchangeLog {
    inner: Arc<Mutex<LogInner>>,
    typing_delay: Duration,
}

impl ExchangeLog {
    pub fn new(typing_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner::default())),
            typing_delay,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn ExchangeObserver>) {
        self.lock().observers.push(observer);
    }

    pub fn route_choices_to(&self, router: Arc<dyn ChoiceRouter>) {
        self.lock().router = Some(router);
    }

    /// Messages resolve after the typing delay, prompts once their choice arrives.
    /// A prompt nobody answers never resolves.
    pub async fn append(&self, payload: EntryPayload) -> Result<Appended, ExchangeError> {
        if payload.is_prompt() {
            self.open_prompt(payload).choice().await.map(Appended::Chosen)
        } else {
            Ok(Appended::Shown(self.post_message(payload).await))
        }
    }

    pub async fn say(&self, text: impl Into<String>) -> Position {
        self.post_message(EntryPayload::message(text)).await
    }

    pub async fn say_with_image(
        &self,
        text: impl Into<String>,
        image: impl Into<String>,
    ) -> Position {
        self.post_message(EntryPayload::image(text, image)).await
    }

    /// Posts a prompt without waiting for its choice. `payload` must be a prompt.
    pub fn open_prompt(&self, payload: EntryPayload) -> OpenPrompt {
        let (tx, rx) = oneshot::channel();
        let position = self.push(Origin::Bot, payload, false, Some(tx));
        OpenPrompt {
            position,
            reply: rx,
        }
    }

    /// Non-blocking typing indicator; pair with [`ExchangeLog::end_typing`].
    pub fn begin_typing(&self, text: impl Into<String>) -> Position {
        self.push(Origin::Bot, EntryPayload::message(text), true, None)
    }

    /// Flips `pending` off. Later calls for the same position do nothing.
    pub fn end_typing(&self, position: Position) {
        let settled = {
            let mut inner = self.lock();
            match inner.entries.get_mut(position) {
                Some(entry) if entry.pending => {
                    entry.pending = false;
                    true
                }
                _ => false,
            }
        };

        if settled {
            self.emit(LogEvent::EntrySettled { position });
        }
    }

    /// Consumes the prompt at `position`. Only the first valid submission wins;
    /// every later one reports `AlreadyAnswered` and reaches nobody.
    pub fn submit_choice(&self, position: Position, selection: Selection) -> SubmitOutcome {
        let (choice, reply, answer_entry, router) = {
            let mut inner = self.lock();

            let Some(entry) = inner.entries.get(position) else {
                return SubmitOutcome::NotFound;
            };
            if !entry.payload.is_prompt() {
                return SubmitOutcome::NotAPrompt;
            }
            if !inner.waiters.contains_key(&position) {
                tracing::debug!("Ignoring duplicate choice for prompt {}", position);
                return SubmitOutcome::AlreadyAnswered;
            }

            let (message, action) = match (&entry.payload, selection) {
                (EntryPayload::ActionPrompt { actions, .. }, Selection::Action(index)) => {
                    match actions.get(index) {
                        Some(action) => (action.caption.clone(), Some(action.clone())),
                        None => return SubmitOutcome::InvalidSelection,
                    }
                }
                (EntryPayload::InputPrompt { .. }, Selection::Text(text))
                    if !text.trim().is_empty() =>
                {
                    (text.trim().to_string(), None)
                }
                _ => return SubmitOutcome::InvalidSelection,
            };

            let Some(reply) = inner.waiters.remove(&position) else {
                return SubmitOutcome::AlreadyAnswered;
            };
            if let Some(entry) = inner.entries.get_mut(position) {
                entry.retracted = true;
            }
            let answer_entry =
                inner.push_entry(Origin::User, EntryPayload::message(&message), false);

            let choice = ChoiceEvent {
                position,
                message,
                action,
            };
            (choice, reply, answer_entry, inner.router.clone())
        };

        tracing::debug!(
            "Prompt {} answered with {:?} (user entry {})",
            position,
            choice.message,
            answer_entry.position
        );
        EXCHANGE_ENTRIES_TOTAL
            .with_label_values(&[answer_entry.payload.kind()])
            .inc();
        self.emit(LogEvent::EntryRetracted { position });
        self.emit(LogEvent::EntryAppended(answer_entry));

        if reply.send(choice.clone()).is_err() {
            tracing::debug!("Prompt {} had no local waiter; routed copy only", position);
        }
        if let Some(router) = router {
            router.route(choice);
        }

        SubmitOutcome::Consumed
    }

    pub fn cue(&self, cue: FeedbackCue) {
        self.emit(LogEvent::FeedbackCue { cue });
    }

    pub fn snapshot(&self) -> Vec<ExchangeEntry> {
        self.lock().entries.clone()
    }

    pub fn entry(&self, position: Position) -> Option<ExchangeEntry> {
        self.lock().entries.get(position).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions of prompts still waiting for a choice, oldest first.
    pub fn open_prompts(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.lock().waiters.keys().copied().collect();
        positions.sort_unstable();
        positions
    }

    async fn post_message(&self, payload: EntryPayload) -> Position {
        let position = self.push(Origin::Bot, payload, true, None);
        if !self.typing_delay.is_zero() {
            sleep(self.typing_delay).await;
        }
        self.end_typing(position);
        position
    }

    fn push(
        &self,
        origin: Origin,
        payload: EntryPayload,
        pending: bool,
        waiter: Option<oneshot::Sender<ChoiceEvent>>,
    ) -> Position {
        let entry = {
            let mut inner = self.lock();
            let entry = inner.push_entry(origin, payload, pending);
            if let Some(waiter) = waiter {
                inner.waiters.insert(entry.position, waiter);
            }
            entry
        };

        tracing::debug!("Appended {} entry at {}", entry.payload.kind(), entry.position);
        EXCHANGE_ENTRIES_TOTAL
            .with_label_values(&[entry.payload.kind()])
            .inc();

        let position = entry.position;
        self.emit(LogEvent::EntryAppended(entry));
        position
    }

    fn emit(&self, event: LogEvent) {
        let observers = self.lock().observers.clone();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fans log events out to live subscribers (the SSE stream).
pub struct BroadcastObserver {
    tx: broadcast::Sender<LogEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }
}

impl ExchangeObserver for BroadcastObserver {
    fn on_event(&self, event: &LogEvent) {
        // no subscribers is fine; the log itself is the source of truth
        let _ = self.tx.send(event.clone());
    }
}

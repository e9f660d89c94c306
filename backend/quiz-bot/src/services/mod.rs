use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::models::session::SessionSnapshot;

use exchange_log::{BroadcastObserver, ExchangeLog};
use quiz_runner::QuizRunner;
use quiz_service::QuizService;

pub struct AppState {
    pub config: Config,
    pub exchange: ExchangeLog,
    pub events: Arc<BroadcastObserver>,
    pub session: watch::Receiver<SessionSnapshot>,
}

impl AppState {
    /// Wires the exchange log, its live event fan-out and the runner for one
    /// bot session. The caller decides where the runner task lives.
    pub fn bootstrap(config: Config, quiz_service: Arc<dyn QuizService>) -> (Self, QuizRunner) {
        let exchange = ExchangeLog::new(config.bot.typing_delay());
        let events = Arc::new(BroadcastObserver::new(config.bot.event_buffer));
        exchange.add_observer(events.clone());

        let runner = QuizRunner::new(exchange.clone(), quiz_service, config.bot.clone());
        let session = runner.status();

        tracing::info!(
            "Bot session wired (typing delay {}ms, event buffer {})",
            config.bot.typing_delay_ms,
            config.bot.event_buffer
        );

        (
            Self {
                config,
                exchange,
                events,
                session,
            },
            runner,
        )
    }
}

pub mod exchange_log;
pub mod quiz_generator;
pub mod quiz_runner;
pub mod quiz_service;

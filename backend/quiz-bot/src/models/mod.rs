use serde::Serialize;

use exchange::{ExchangeEntry, Position};

pub mod exchange;
pub mod quiz;
pub mod session;

/// What the presentation layer renders: every entry plus the prompts still open.
#[derive(Debug, Serialize)]
pub struct ExchangeView {
    pub entries: Vec<ExchangeEntry>,
    pub open_prompts: Vec<Position>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceAccepted {
    pub position: Position,
    pub status: &'static str,
}

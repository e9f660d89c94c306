use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quiz::{Answer, QuestionId};

/// Index of an entry in the exchange log. Stable for the life of the log.
pub type Position = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Bot,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    Welcome,
    Answer,
    PlayAgain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionTag {
    StartQuiz,
    Answer {
        question_id: QuestionId,
        answer_index: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub caption: String,
    pub tag: ActionTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Action {
    pub const START_QUIZ: &'static str = "START QUIZ";

    pub fn start_quiz() -> Self {
        Self {
            caption: Self::START_QUIZ.to_string(),
            tag: ActionTag::StartQuiz,
            icon: Some("ti-rocket".to_string()),
        }
    }

    pub fn answer(question_id: &str, answer: &Answer) -> Self {
        Self {
            caption: answer.text.clone(),
            tag: ActionTag::Answer {
                question_id: question_id.to_string(),
                answer_index: answer.index,
            },
            icon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPayload {
    Message {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    ActionPrompt {
        state: PromptState,
        actions: Vec<Action>,
    },
    InputPrompt {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
}

impl EntryPayload {
    pub fn message(text: impl Into<String>) -> Self {
        EntryPayload::Message {
            text: text.into(),
            image: None,
        }
    }

    pub fn image(text: impl Into<String>, image: impl Into<String>) -> Self {
        EntryPayload::Message {
            text: text.into(),
            image: Some(image.into()),
        }
    }

    pub fn actions(state: PromptState, actions: Vec<Action>) -> Self {
        EntryPayload::ActionPrompt { state, actions }
    }

    pub fn input(text: impl Into<String>, placeholder: Option<String>) -> Self {
        EntryPayload::InputPrompt {
            text: text.into(),
            placeholder,
        }
    }

    pub fn is_prompt(&self) -> bool {
        !matches!(self, EntryPayload::Message { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EntryPayload::Message { .. } => "message",
            EntryPayload::ActionPrompt { .. } => "action_prompt",
            EntryPayload::InputPrompt { .. } => "input_prompt",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            EntryPayload::Message { text, .. } | EntryPayload::InputPrompt { text, .. } => {
                Some(text)
            }
            EntryPayload::ActionPrompt { .. } => None,
        }
    }
}

/// One item of the conversation. Only `pending` and `retracted` change after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub position: Position,
    pub origin: Origin,
    #[serde(flatten)]
    pub payload: EntryPayload,
    pub pending: bool,
    /// Answered prompts are hidden rather than removed so positions stay valid.
    pub retracted: bool,
    pub created_at: DateTime<Utc>,
}

impl ExchangeEntry {
    pub fn is_visible(&self) -> bool {
        !self.retracted
    }
}

/// What the presentation layer sends back for an open prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Action(usize),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChoiceRequest {
    Action { action: usize },
    Text { text: String },
}

impl From<ChoiceRequest> for Selection {
    fn from(req: ChoiceRequest) -> Self {
        match req {
            ChoiceRequest::Action { action } => Selection::Action(action),
            ChoiceRequest::Text { text } => Selection::Text(text),
        }
    }
}

/// Resolution of a prompt, delivered once to the waiter and once to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceEvent {
    pub position: Position,
    pub message: String,
    pub action: Option<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmitOutcome {
    Consumed,
    AlreadyAnswered,
    NotAPrompt,
    InvalidSelection,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCue {
    Action,
    Error,
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LogEvent {
    EntryAppended(ExchangeEntry),
    EntrySettled { position: Position },
    EntryRetracted { position: Position },
    FeedbackCue { cue: FeedbackCue },
}

impl LogEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            LogEvent::EntryAppended(_) => "entry-appended",
            LogEvent::EntrySettled { .. } => "entry-settled",
            LogEvent::EntryRetracted { .. } => "entry-retracted",
            LogEvent::FeedbackCue { .. } => "feedback-cue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_flat_payload() {
        let entry = ExchangeEntry {
            position: 3,
            origin: Origin::Bot,
            payload: EntryPayload::actions(PromptState::Welcome, vec![Action::start_quiz()]),
            pending: false,
            retracted: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "action_prompt");
        assert_eq!(json["state"], "welcome");
        assert_eq!(json["actions"][0]["caption"], "START QUIZ");
        assert_eq!(json["actions"][0]["tag"]["type"], "start_quiz");
        assert_eq!(json["origin"], "bot");
    }

    #[test]
    fn test_choice_request_parses_both_shapes() {
        let action: ChoiceRequest = serde_json::from_str(r#"{"action": 2}"#).unwrap();
        assert_eq!(Selection::from(action), Selection::Action(2));

        let text: ChoiceRequest = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(Selection::from(text), Selection::Text("hello".to_string()));
    }

    #[test]
    fn test_log_event_names_match_payload_tag() {
        let event = LogEvent::FeedbackCue {
            cue: FeedbackCue::Error,
        };
        assert_eq!(event.event_name(), "feedback-cue");
        assert!(event.to_sse_data().contains(r#""type":"feedback-cue""#));
        assert!(event.to_sse_data().contains(r#""cue":"error""#));
    }
}

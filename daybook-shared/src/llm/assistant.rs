//! Scheduling assistant
//!
//! Wraps an [`LlmClient`] with the two conversations the calendar needs:
//!
//! - **parse_image**: image + instruction → list of suggested events
//! - **schedule_event**: chat history → one new event, or a clarifying
//!   question
//!
//! Model failures never surface as errors here. Callers get a well-formed
//! outcome they can hand straight to the client, with the failure logged.
//!
//! # Reconciliation
//!
//! ```text
//! model reply ──parse──► {"status": "success", "event": {...}}
//!                          ├─ event has title + valid date ──► Success { newEvent (fresh id) }
//!                          └─ otherwise ──────────────────────► Question { generic prompt }
//!                        {"status": "question", "message": ..} ► Question { message }
//!                        anything else / call failed ─────────► Error { rephrase fallback }
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::client::{ChatMessage, LlmClient, LlmError};
use super::image::ImagePayload;
use super::prompts::{schedule_system_prompt, DEFAULT_IMAGE_INSTRUCTION, IMAGE_SYSTEM_PROMPT};
use super::reply::parse_json_reply;
use crate::models::event::{parse_date, Event, EventDraft};

/// Chat message shown when the model's answer can't be used
pub const REPHRASE_MESSAGE: &str = "Sorry, I didn't quite catch that. Could you please rephrase?";

/// Question asked when the model claims success without a usable event
pub const MISSING_DETAILS_MESSAGE: &str =
    "Could you tell me a bit more about the event? I need at least a title, a date and a start time.";

/// One turn of the client-side conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `"user"` for the person, anything else for the assistant
    pub sender: String,

    #[serde(default)]
    pub text: String,
}

/// Result of an image parse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageParseOutcome {
    pub suggested_events: Vec<EventDraft>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a scheduling turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScheduleOutcome {
    Success {
        #[serde(rename = "newEvent")]
        new_event: Event,
    },
    Question {
        message: String,
    },
    Error {
        message: String,
    },
}

/// What the model is asked to answer with
#[derive(Debug, Default, Deserialize)]
struct ScheduleVerdict {
    #[serde(default)]
    status: String,

    #[serde(default)]
    event: Option<Value>,

    #[serde(default)]
    message: Option<String>,
}

/// LLM-backed scheduling assistant
#[derive(Clone)]
pub struct Assistant {
    client: Arc<dyn LlmClient>,
    text_model: String,
    vision_model: String,
}

impl Assistant {
    pub fn new(
        client: Arc<dyn LlmClient>,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        }
    }

    /// Asks the vision model for the events shown in `image`
    pub async fn parse_image(&self, image: &ImagePayload, prompt: &str) -> ImageParseOutcome {
        let instruction = match prompt.trim() {
            "" => DEFAULT_IMAGE_INSTRUCTION,
            text => text,
        };

        let messages = vec![
            ChatMessage::system(IMAGE_SYSTEM_PROMPT),
            ChatMessage::user_with_image(instruction, image.data_url()),
        ];

        let result = match self.client.complete(&self.vision_model, messages).await {
            Ok(reply) => parse_json_reply(&reply).and_then(drafts_from_reply),
            Err(e) => Err(e),
        };

        match result {
            Ok(suggested_events) => {
                info!(
                    count = suggested_events.len(),
                    image_bytes = image.size(),
                    mime = image.mime(),
                    "Parsed events from image"
                );
                ImageParseOutcome {
                    suggested_events,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Image parsing failed");
                ImageParseOutcome {
                    suggested_events: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Runs one scheduling turn over the conversation so far
    pub async fn schedule_event(&self, history: &[ChatTurn], today: NaiveDate) -> ScheduleOutcome {
        let mut messages = vec![ChatMessage::system(schedule_system_prompt(today))];
        messages.extend(
            history
                .iter()
                .filter(|turn| !turn.text.trim().is_empty())
                .map(|turn| {
                    if turn.sender == "user" {
                        ChatMessage::user(turn.text.trim())
                    } else {
                        ChatMessage::assistant(turn.text.trim())
                    }
                }),
        );

        let reply = match self.client.complete(&self.text_model, messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Scheduling call failed");
                return rephrase();
            }
        };

        match parse_json_reply(&reply) {
            Ok(value) => reconcile(value),
            Err(e) => {
                warn!(error = %e, "Scheduling reply was not JSON");
                rephrase()
            }
        }
    }
}

fn rephrase() -> ScheduleOutcome {
    ScheduleOutcome::Error {
        message: REPHRASE_MESSAGE.to_string(),
    }
}

/// Maps the model's verdict onto an outcome
fn reconcile(value: Value) -> ScheduleOutcome {
    if !value.is_object() {
        warn!("Scheduling reply was not a JSON object");
        return rephrase();
    }

    // Some models put the event fields next to `status` instead of under `event`
    let top_level = value.clone();
    let verdict: ScheduleVerdict = serde_json::from_value(value).unwrap_or_default();

    match verdict.status.trim().to_ascii_lowercase().as_str() {
        "success" => {
            let raw_event = verdict.event.unwrap_or(top_level);
            match complete_draft(raw_event) {
                Some(draft) => {
                    let new_event = Event::from_draft(draft, uuid::Uuid::new_v4().to_string());
                    info!(id = ?new_event.id(), title = ?new_event.title(), "Assistant scheduled event");
                    ScheduleOutcome::Success { new_event }
                }
                None => {
                    warn!("Assistant reported success without a usable event");
                    ScheduleOutcome::Question {
                        message: verdict
                            .message
                            .filter(|m| !m.trim().is_empty())
                            .unwrap_or_else(|| MISSING_DETAILS_MESSAGE.to_string()),
                    }
                }
            }
        }
        "question" => ScheduleOutcome::Question {
            message: verdict
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| MISSING_DETAILS_MESSAGE.to_string()),
        },
        other => {
            warn!(status = other, "Unexpected scheduling status");
            rephrase()
        }
    }
}

/// Validates an event proposal and fills the defaults
///
/// Needs a title and a parseable date. A missing end time becomes one hour
/// after the start (capped at 23:59).
fn complete_draft(raw: Value) -> Option<EventDraft> {
    let mut draft: EventDraft = serde_json::from_value(raw).ok()?;

    if draft.title.is_empty() {
        return None;
    }
    let date = parse_date(&draft.date)?;
    draft.date = date.format("%Y-%m-%d").to_string();

    if let Some(start) = parse_time(&draft.start_time) {
        draft.start_time = start.format("%H:%M").to_string();
        if parse_time(&draft.end_time).is_none() {
            draft.end_time = one_hour_after(start).format("%H:%M").to_string();
        }
    }

    Some(draft)
}

/// Accepts `HH:MM` and `HH:MM:SS`
fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

fn one_hour_after(start: NaiveTime) -> NaiveTime {
    let (end, wrapped) = start.overflowing_add_signed(Duration::hours(1));
    if wrapped != 0 {
        NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(start)
    } else {
        end
    }
}

/// Keeps the object entries of an image-parse reply
fn drafts_from_reply(value: Value) -> Result<Vec<EventDraft>, LlmError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(LlmError::MalformedReply(format!(
                "expected a list of events, got {}",
                other
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{LlmResult, MessageContent, Role};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent
    struct ScriptedClient {
        replies: Mutex<Vec<LlmResult<String>>>,
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<LlmResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, model: &str, messages: Vec<ChatMessage>) -> LlmResult<String> {
            self.seen.lock().unwrap().push((model.to_string(), messages));
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(LlmError::EmptyReply)
            } else {
                replies.remove(0)
            }
        }
    }

    fn assistant(client: Arc<ScriptedClient>) -> Assistant {
        Assistant::new(client, "text-model", "vision-model")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn user(text: &str) -> ChatTurn {
        ChatTurn {
            sender: "user".to_string(),
            text: text.to_string(),
        }
    }

    fn png() -> ImagePayload {
        ImagePayload::parse("data:image/png;base64,iVBORw0KGgo=").unwrap()
    }

    #[tokio::test]
    async fn test_schedule_success_assigns_id() {
        let client = ScriptedClient::new(vec![Ok(json!({
            "status": "success",
            "event": {
                "title": "Book sort",
                "date": "2025-03-14",
                "startTime": "18:00",
                "endTime": "19:30",
                "location": "Library"
            }
        })
        .to_string())]);

        let outcome = assistant(client.clone())
            .schedule_event(&[user("book sort today at 6pm in the library")], today())
            .await;

        let ScheduleOutcome::Success { new_event } = outcome else {
            panic!("expected success");
        };
        assert!(uuid::Uuid::parse_str(&new_event.id().unwrap()).is_ok());
        assert_eq!(new_event.title(), Some("Book sort"));
        assert_eq!(new_event.as_map()["endTime"], "19:30");
        assert_eq!(new_event.as_map()["description"], "");
        assert_eq!(new_event.recurrence_rule(), Some("NONE"));

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, "text-model");
        assert_eq!(seen[0].1[0].role, Role::System);
        assert_eq!(seen[0].1[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_schedule_defaults_end_time() {
        let client = ScriptedClient::new(vec![Ok(
            "```json\n{\"status\": \"success\", \"event\": {\"title\": \"Run\", \"date\": \"2025-03-15\", \"startTime\": \"7:05\"}}\n```"
                .to_string(),
        )]);

        let outcome = assistant(client).schedule_event(&[user("run tomorrow 7:05")], today()).await;

        let ScheduleOutcome::Success { new_event } = outcome else {
            panic!("expected success");
        };
        assert_eq!(new_event.as_map()["startTime"], "07:05");
        assert_eq!(new_event.as_map()["endTime"], "08:05");
    }

    #[tokio::test]
    async fn test_schedule_question() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"status": "question", "message": "What time should it start?"}"#.to_string(),
        )]);

        let outcome = assistant(client).schedule_event(&[user("dentist friday")], today()).await;
        assert_eq!(
            outcome,
            ScheduleOutcome::Question {
                message: "What time should it start?".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_schedule_success_without_date_becomes_question() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"status": "success", "event": {"title": "Something"}}"#.to_string(),
        )]);

        let outcome = assistant(client).schedule_event(&[user("something")], today()).await;
        assert_eq!(
            outcome,
            ScheduleOutcome::Question {
                message: MISSING_DETAILS_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_schedule_accepts_flat_event() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"status": "success", "title": "Flat", "date": "2025-04-01", "startTime": "10:00"}"#
                .to_string(),
        )]);

        let outcome = assistant(client).schedule_event(&[user("flat")], today()).await;
        assert!(matches!(outcome, ScheduleOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn test_schedule_failures_fall_back_to_rephrase() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::Transport("down".into())),
            Ok("I am not JSON".to_string()),
            Ok(r#"["a list"]"#.to_string()),
            Ok(r#"{"status": "maybe"}"#.to_string()),
        ]);
        let assistant = assistant(client);

        for _ in 0..4 {
            let outcome = assistant.schedule_event(&[user("hi")], today()).await;
            assert_eq!(
                outcome,
                ScheduleOutcome::Error {
                    message: REPHRASE_MESSAGE.to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_schedule_maps_history_roles() {
        let client = ScriptedClient::new(vec![Ok(r#"{"status":"question","message":"?"}"#.into())]);
        let history = vec![
            user("lunch with sam"),
            ChatTurn {
                sender: "ai".to_string(),
                text: "When?".to_string(),
            },
            user("   "),
            user("noon tomorrow"),
        ];

        assistant(client.clone()).schedule_event(&history, today()).await;

        let seen = client.seen.lock().unwrap();
        let roles: Vec<Role> = seen[0].1.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    }

    #[test]
    fn test_outcome_serialization() {
        let question = serde_json::to_value(ScheduleOutcome::Question {
            message: "When?".into(),
        })
        .unwrap();
        assert_eq!(question, json!({"status": "question", "message": "When?"}));

        let event = Event::from_value(json!({"id": "x", "title": "t"})).unwrap();
        let success = serde_json::to_value(ScheduleOutcome::Success { new_event: event }).unwrap();
        assert_eq!(success["status"], "success");
        assert_eq!(success["newEvent"]["id"], "x");
    }

    #[tokio::test]
    async fn test_parse_image_returns_drafts() {
        let client = ScriptedClient::new(vec![Ok(
            "```json\n[{\"title\": \"Concert\", \"date\": \"2025-06-01\", \"startTime\": \"20:00\", \"endTime\": \"22:00\", \"location\": \"Hall\"}, \"noise\"]\n```"
                .to_string(),
        )]);

        let outcome = assistant(client.clone()).parse_image(&png(), "").await;

        assert!(outcome.error.is_none());
        assert_eq!(outcome.suggested_events.len(), 1);
        assert_eq!(outcome.suggested_events[0].title, "Concert");

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, "vision-model");
        let MessageContent::Parts(parts) = &seen[0].1[1].content else {
            panic!("expected multimodal message");
        };
        assert_eq!(parts.len(), 2);
        let body = serde_json::to_value(&parts[0]).unwrap();
        assert_eq!(body["text"], DEFAULT_IMAGE_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_parse_image_failure_is_reported() {
        let client = ScriptedClient::new(vec![Ok("No events here, sorry.".to_string())]);

        let outcome = assistant(client).parse_image(&png(), "find events").await;

        assert!(outcome.suggested_events.is_empty());
        assert!(outcome.error.is_some());
        let body = serde_json::to_value(&outcome).unwrap();
        assert_eq!(body["suggested_events"], json!([]));
    }

    #[tokio::test]
    async fn test_parse_image_requires_a_list() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"title": "Concert", "date": "2025-06-01"}"#.to_string(),
        )]);

        let outcome = assistant(client).parse_image(&png(), "").await;

        assert!(outcome.suggested_events.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_one_hour_after_caps_at_midnight() {
        let late = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        assert_eq!(one_hour_after(late), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }
}

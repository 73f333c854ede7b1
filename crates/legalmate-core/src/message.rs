//! UI-agnostic conversation message types
//!
//! These are shared by every shell (terminal UI, tests, anything embedding
//! the core) and don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Shown in place of an answer when a reply carries no usable text.
pub const UNPARSEABLE_ANSWER: &str = "Could not parse the API response.";

/// One entry of the visible conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    User(String),
    Assistant(Answer),
    Error(String),
}

impl Message {
    pub fn is_user(&self) -> bool {
        matches!(self, Message::User(_))
    }

    /// Display text regardless of role.
    pub fn text(&self) -> &str {
        match self {
            Message::User(text) | Message::Error(text) => text,
            Message::Assistant(answer) => answer.text(),
        }
    }
}

/// A normalized assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Structured {
        explanation: String,
        metadata: AnswerMetadata,
    },
    Plain {
        text: String,
    },
}

impl Answer {
    pub fn plain(text: impl Into<String>) -> Self {
        Answer::Plain { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Answer::Structured { explanation, .. } => explanation,
            Answer::Plain { text } => text,
        }
    }

    pub fn metadata(&self) -> Option<&AnswerMetadata> {
        match self {
            Answer::Structured { metadata, .. } => Some(metadata),
            Answer::Plain { .. } => None,
        }
    }

    /// Normalizes a `{response, metadata?}` reply body.
    pub(crate) fn from_reply(reply: AssistantReply) -> Self {
        let response = match reply.response {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Answer::plain(UNPARSEABLE_ANSWER),
        };

        match reply.metadata.and_then(AnswerMetadata::from_value) {
            Some(metadata) => Answer::Structured {
                explanation: response,
                metadata,
            },
            None => Answer::plain(response),
        }
    }

    /// Normalizes the content of a stored `ai` history record. Content that is
    /// itself a reply object is structured; anything else is plain text.
    fn from_history_content(content: Value) -> Self {
        match content {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(obj)) if obj.contains_key("response") => {
                    Self::from_history_content(Value::Object(obj))
                }
                _ => Answer::plain(text),
            },
            Value::Object(obj) if obj.contains_key("response") => {
                match serde_json::from_value::<AssistantReply>(Value::Object(obj)) {
                    // Stored replies are always structured, metadata or not
                    Ok(reply) => Answer::from_reply(AssistantReply {
                        response: reply.response,
                        metadata: Some(reply.metadata.unwrap_or_else(|| Value::Object(Map::new()))),
                    }),
                    Err(_) => Answer::plain(UNPARSEABLE_ANSWER),
                }
            }
            other => Answer::plain(other.to_string()),
        }
    }
}

/// Metadata the adaptive endpoint attaches to an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_legal_sections: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnswerMetadata {
    /// `None` unless `value` is a JSON object. Known keys with an unexpected
    /// shape are kept in `extra` rather than rejected.
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };

        match serde_json::from_value::<AnswerMetadata>(Value::Object(map.clone())) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                debug!(error = %err, "Answer metadata did not match known fields");
                Some(AnswerMetadata {
                    extra: map,
                    ..Default::default()
                })
            }
        }
    }
}

/// Wire shape of both send endpoints.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AssistantReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One stored message as the history endpoint returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
}

impl HistoryRecord {
    /// `human`/`user` records become user messages, `ai` records assistant
    /// messages. Other record types are not part of the visible conversation.
    pub fn into_message(self) -> Option<Message> {
        match self.kind.as_str() {
            "human" | "user" => Some(Message::User(match self.content {
                Value::String(text) => text,
                other => other.to_string(),
            })),
            "ai" => Some(Message::Assistant(Answer::from_history_content(self.content))),
            other => {
                debug!(kind = other, "Skipping history record of unknown type");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: Value) -> AssistantReply {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn reply_with_metadata_is_structured() {
        let answer = Answer::from_reply(reply(json!({
            "response": "Section 420 deals with cheating.",
            "session_id": "abc",
            "response_type": "adaptive",
            "metadata": {
                "query_type": "legal_specific",
                "has_legal_sections": true,
                "complexity": "simple",
                "word_count": 5
            }
        })));

        match answer {
            Answer::Structured {
                explanation,
                metadata,
            } => {
                assert_eq!(explanation, "Section 420 deals with cheating.");
                assert_eq!(metadata.query_type.as_deref(), Some("legal_specific"));
                assert_eq!(metadata.has_legal_sections, Some(true));
                assert_eq!(metadata.word_count, Some(5));
                assert!(metadata.extra.is_empty());
            }
            other => panic!("expected structured answer, got {other:?}"),
        }
    }

    #[test]
    fn reply_without_metadata_is_plain() {
        let answer = Answer::from_reply(reply(json!({
            "response": "Plain words.",
            "session_id": "abc"
        })));
        assert_eq!(answer, Answer::plain("Plain words."));
    }

    #[test]
    fn reply_without_response_is_unparseable() {
        let answer = Answer::from_reply(reply(json!({ "metadata": {} })));
        assert_eq!(answer, Answer::plain(UNPARSEABLE_ANSWER));

        let answer = Answer::from_reply(reply(json!({ "response": "  " })));
        assert_eq!(answer, Answer::plain(UNPARSEABLE_ANSWER));
    }

    #[test]
    fn mistyped_metadata_is_kept_as_extra() {
        let answer = Answer::from_reply(reply(json!({
            "response": "ok",
            "metadata": { "word_count": "many", "source": "rag" }
        })));
        let metadata = answer.metadata().unwrap();
        assert_eq!(metadata.word_count, None);
        assert_eq!(metadata.extra.get("source"), Some(&json!("rag")));
        assert_eq!(metadata.extra.get("word_count"), Some(&json!("many")));
    }

    #[test]
    fn history_records_map_to_roles() {
        let human: HistoryRecord =
            serde_json::from_value(json!({"type": "human", "content": "Hi"})).unwrap();
        let user: HistoryRecord =
            serde_json::from_value(json!({"type": "user", "content": "Hello"})).unwrap();
        let ai: HistoryRecord =
            serde_json::from_value(json!({"type": "ai", "content": "Namaste"})).unwrap();
        let system: HistoryRecord =
            serde_json::from_value(json!({"type": "system", "content": "x"})).unwrap();

        assert_eq!(human.into_message(), Some(Message::User("Hi".into())));
        assert_eq!(user.into_message(), Some(Message::User("Hello".into())));
        assert_eq!(
            ai.into_message(),
            Some(Message::Assistant(Answer::plain("Namaste")))
        );
        assert_eq!(system.into_message(), None);
    }

    #[test]
    fn ai_history_holding_a_reply_object_is_structured() {
        let record = HistoryRecord {
            kind: "ai".into(),
            content: Value::String(r#"{"response":"Stored answer","metadata":{"complexity":"simple"}}"#.into()),
        };

        let message = record.into_message().unwrap();
        match message {
            Message::Assistant(Answer::Structured {
                explanation,
                metadata,
            }) => {
                assert_eq!(explanation, "Stored answer");
                assert_eq!(metadata.complexity.as_deref(), Some("simple"));
            }
            other => panic!("expected structured answer, got {other:?}"),
        }
    }

    #[test]
    fn message_serializes_with_role_tag() {
        let value = serde_json::to_value(Message::Error("boom".into())).unwrap();
        assert_eq!(value, json!({"role": "error", "content": "boom"}));
    }
}

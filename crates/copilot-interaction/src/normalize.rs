//! Normalization of loosely-shaped chat replies into a [`Message`].
//!
//! Rules are evaluated top to bottom; the first match wins. When nothing
//! matches, the raw response is stringified into an assistant message.

use crate::api_client::ResponseBody;
use copilot_core::session::{Message, MessageRole};
use serde_json::Value;

/// Content used when the backend replied with nothing usable.
pub const EMPTY_REPLY: &str = "(no response)";

/// A single normalization rule.
pub type NormalizeRule = fn(&Value) -> Option<Message>;

/// Ordered rule chain. Names are used only for logging.
pub const RULES: &[(&str, NormalizeRule)] = &[
    ("message", message_field),
    ("reply", reply_field),
    ("data", data_field),
    ("top_level", top_level),
];

/// Converts a chat response into a message. Never fails.
pub fn normalize_reply(body: &ResponseBody) -> Message {
    if let Some(value) = body.as_json() {
        for (name, rule) in RULES {
            if let Some(message) = rule(value) {
                tracing::debug!(rule = *name, "[normalize] Matched reply shape");
                return message;
            }
        }
    }
    tracing::debug!("[normalize] No rule matched, stringifying response");
    fallback(body)
}

/// `{"message": {"role": ..., "content": ...}}`
fn message_field(value: &Value) -> Option<Message> {
    value.get("message").and_then(role_and_content)
}

/// `{"reply": "..."}`
fn reply_field(value: &Value) -> Option<Message> {
    value
        .get("reply")
        .and_then(Value::as_str)
        .map(Message::assistant)
}

/// `{"data": {"role": ..., "content": ...}}`
fn data_field(value: &Value) -> Option<Message> {
    value.get("data").and_then(role_and_content)
}

/// `{"role": ..., "content": ...}`
fn top_level(value: &Value) -> Option<Message> {
    role_and_content(value)
}

fn role_and_content(value: &Value) -> Option<Message> {
    let role = value
        .get("role")
        .and_then(Value::as_str)
        .and_then(MessageRole::from_wire)?;
    let content = value.get("content").and_then(Value::as_str)?;
    Some(Message::new(role, content))
}

fn fallback(body: &ResponseBody) -> Message {
    let text = match body {
        ResponseBody::Text(text) => text.clone(),
        ResponseBody::Json(Value::Null) => String::new(),
        ResponseBody::Json(Value::String(text)) => text.clone(),
        ResponseBody::Json(other) => other.to_string(),
    };
    if text.trim().is_empty() {
        Message::assistant(EMPTY_REPLY)
    } else {
        Message::assistant(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_body(value: Value) -> ResponseBody {
        ResponseBody::Json(value)
    }

    #[test]
    fn test_message_field_preferred() {
        let body = json_body(json!({
            "message": {"role": "assistant", "content": "Hello!"},
            "reply": "ignored"
        }));
        assert_eq!(normalize_reply(&body), Message::assistant("Hello!"));
    }

    #[test]
    fn test_reply_string_wrapped_as_assistant() {
        let body = json_body(json!({"reply": "Pong"}));
        assert_eq!(normalize_reply(&body), Message::assistant("Pong"));
    }

    #[test]
    fn test_data_field_keeps_role() {
        let body = json_body(json!({"data": {"role": "system", "content": "note"}}));
        assert_eq!(
            normalize_reply(&body),
            Message::new(MessageRole::System, "note")
        );
    }

    #[test]
    fn test_top_level_role_and_content() {
        let body = json_body(json!({"role": "assistant", "content": "flat"}));
        assert_eq!(normalize_reply(&body), Message::assistant("flat"));
    }

    #[test]
    fn test_malformed_message_falls_through() {
        // Non-string reply and unknown role do not match any rule.
        let raw = json!({"message": {"role": "bot", "content": "x"}, "reply": 3});
        let message = normalize_reply(&json_body(raw.clone()));
        assert_eq!(message.role, MessageRole::Assistant);
        let echoed: Value = serde_json::from_str(&message.content).unwrap();
        assert_eq!(echoed, raw);
    }

    #[test]
    fn test_plain_text_reply() {
        let body = ResponseBody::Text("just text".into());
        assert_eq!(normalize_reply(&body), Message::assistant("just text"));
    }

    #[test]
    fn test_empty_reply_becomes_placeholder() {
        for body in [
            ResponseBody::Text(String::new()),
            ResponseBody::Text("  \n".into()),
            json_body(Value::Null),
            json_body(json!("")),
        ] {
            assert_eq!(normalize_reply(&body), Message::assistant(EMPTY_REPLY));
        }
    }
}

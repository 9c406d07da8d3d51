//! Parses Telegram updates into the closed inbound command set.
//!
//! Only two shapes matter to the core: callback queries carrying the
//! compact button payload, and `/panic` messages from travelers. Every
//! other update is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::application::PayloadParser;
use crate::domain::commands::{CallbackAction, CallbackData, InboundCommand};
use crate::domain::foundation::DomainError;

/// Extracts the deduplication event id from a raw update payload.
pub fn update_event_id(payload: &Value) -> Option<String> {
    payload
        .get("update_id")
        .and_then(|v| v.as_i64())
        .map(|id| id.to_string())
}

#[derive(Debug, Deserialize)]
struct Update {
    #[allow(dead_code)]
    update_id: i64,
    callback_query: Option<CallbackQuery>,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: TelegramUser,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

/// Payload parser for the `telegram` provider tag.
#[derive(Default)]
pub struct TelegramUpdateParser;

impl TelegramUpdateParser {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadParser for TelegramUpdateParser {
    fn parse(&self, payload: &Value) -> Result<Vec<InboundCommand>, DomainError> {
        let update: Update = serde_json::from_value(payload.clone())
            .map_err(|e| DomainError::validation("update", e.to_string()))?;

        if let Some(callback) = update.callback_query {
            let Some(data) = callback.data.as_deref() else {
                return Ok(vec![]);
            };
            let parsed = CallbackData::parse(data).map_err(DomainError::from)?;
            let by_chat_user = callback.from.id.to_string();

            let command = match parsed.action {
                CallbackAction::Ack => InboundCommand::ChatAck {
                    incident_id: parsed.incident_id,
                    by_chat_user,
                    callback_id: callback.id,
                },
                CallbackAction::Cancel => InboundCommand::ChatCancel {
                    incident_id: parsed.incident_id,
                    by_chat_user,
                    callback_id: callback.id,
                },
            };
            return Ok(vec![command]);
        }

        if let Some(message) = update.message {
            let is_panic = message
                .text
                .as_deref()
                .map(|t| t.trim().starts_with("/panic"))
                .unwrap_or(false);
            if is_panic {
                if let Some(from) = message.from {
                    return Ok(vec![InboundCommand::ChatPanic {
                        by_chat_user: from.id.to_string(),
                    }]);
                }
            }
        }

        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::IncidentId;
    use serde_json::json;

    #[test]
    fn extracts_update_id() {
        let payload = json!({ "update_id": 7_000_001, "message": {} });
        assert_eq!(update_event_id(&payload).as_deref(), Some("7000001"));
    }

    #[test]
    fn parses_ack_callback() {
        let incident_id = IncidentId::new();
        let payload = json!({
            "update_id": 1,
            "callback_query": {
                "id": "cb-9",
                "from": { "id": 42 },
                "data": format!("v1|ack|{}", incident_id),
            }
        });

        let commands = TelegramUpdateParser::new().parse(&payload).unwrap();

        assert_eq!(
            commands,
            vec![InboundCommand::ChatAck {
                incident_id,
                by_chat_user: "42".to_string(),
                callback_id: "cb-9".to_string(),
            }]
        );
    }

    #[test]
    fn parses_cancel_callback() {
        let incident_id = IncidentId::new();
        let payload = json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-10",
                "from": { "id": 43 },
                "data": format!("v1|cancel|{}", incident_id),
            }
        });

        let commands = TelegramUpdateParser::new().parse(&payload).unwrap();

        assert!(matches!(
            commands.as_slice(),
            [InboundCommand::ChatCancel { .. }]
        ));
    }

    #[test]
    fn parses_panic_message() {
        let payload = json!({
            "update_id": 3,
            "message": { "from": { "id": 44 }, "text": "/panic" }
        });

        let commands = TelegramUpdateParser::new().parse(&payload).unwrap();

        assert_eq!(
            commands,
            vec![InboundCommand::ChatPanic {
                by_chat_user: "44".to_string(),
            }]
        );
    }

    #[test]
    fn ignores_small_talk() {
        let payload = json!({
            "update_id": 4,
            "message": { "from": { "id": 44 }, "text": "hello there" }
        });

        let commands = TelegramUpdateParser::new().parse(&payload).unwrap();
        assert!(commands.is_empty());
    }

    #[test]
    fn malformed_callback_data_is_an_error() {
        let payload = json!({
            "update_id": 5,
            "callback_query": { "id": "cb", "from": { "id": 1 }, "data": "v9|bogus|x" }
        });

        assert!(TelegramUpdateParser::new().parse(&payload).is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ChatMessage, NotificationResponse};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },

    /// A chat message was posted in a conversation
    MessageCreate { message: ChatMessage },

    /// The other participant started typing
    TypingStart { conversation_id: Uuid, user_id: Uuid },

    /// The other participant stopped typing
    TypingStop { conversation_id: Uuid, user_id: Uuid },

    /// The other participant read every message up to `read_at`
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    },

    /// A notification was stored for this user
    NotificationCreate { notification: NotificationResponse },
}

impl GatewayEvent {
    /// Conversation the event belongs to, if it is chat traffic.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.conversation_id),
            Self::TypingStart { conversation_id, .. }
            | Self::TypingStop { conversation_id, .. }
            | Self::MessagesRead { conversation_id, .. } => Some(*conversation_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Indicate typing in a conversation
    StartTyping { conversation_id: Uuid },

    StopTyping { conversation_id: Uuid },

    /// Mark every message from the other participant as read
    MarkRead { conversation_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_tagged_camel_case() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"StartTyping","data":{{"conversationId":"{id}"}}}}"#);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::StartTyping { conversation_id } => assert_eq!(conversation_id, id),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_type_and_data() {
        let user_id = Uuid::new_v4();
        let json = serde_json::to_value(GatewayEvent::PresenceUpdate {
            user_id,
            online: true,
        })
        .unwrap();
        assert_eq!(json["type"], "PresenceUpdate");
        assert_eq!(json["data"]["userId"], user_id.to_string());
        assert_eq!(json["data"]["online"], true);
    }

    #[test]
    fn presence_is_not_conversation_scoped() {
        let event = GatewayEvent::PresenceUpdate {
            user_id: Uuid::new_v4(),
            online: false,
        };
        assert!(event.conversation_id().is_none());

        let conversation_id = Uuid::new_v4();
        let typing = GatewayEvent::TypingStart {
            conversation_id,
            user_id: Uuid::new_v4(),
        };
        assert_eq!(typing.conversation_id(), Some(conversation_id));
    }
}

//! Endpoint parameter types.
//!
//! Arguments are validated locally, before any network call; a failed
//! validation never reaches the queue.

use bytes::Bytes;
use serde::Serialize;
use validator::Validate;

/// Maximum length of a message body.
pub const MAX_MESSAGE_LENGTH: u64 = 4000;

/// Maximum number of messages per list request.
pub const MAX_MESSAGES_PER_BATCH: u32 = 100;

/// Parameters for creating a message.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Message text.
    #[validate(length(min = 1, max = 4000))]
    pub content: String,
    /// Client-supplied idempotency marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl CreateMessageParams {
    /// Parameters with just a content body.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            nonce: None,
        }
    }
}

/// Parameters for editing a message.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMessageParams {
    /// Replacement text.
    #[validate(length(min = 1, max = 4000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Parameters for creating a channel.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelParams {
    /// Channel name.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Channel topic.
    #[validate(length(max = 1024))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl CreateChannelParams {
    /// Parameters with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: None,
        }
    }
}

/// Parameters for modifying a channel.
#[derive(Debug, Clone, Default, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModifyChannelParams {
    /// New channel name.
    #[validate(length(min = 1, max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New channel topic.
    #[validate(length(max = 1024))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Parameters for listing channel messages.
#[derive(Debug, Clone, Copy, Default, Validate)]
pub struct GetMessagesParams {
    /// Page size, at most [`MAX_MESSAGES_PER_BATCH`].
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    /// Only messages before this id.
    pub before: Option<u64>,
    /// Only messages after this id.
    pub after: Option<u64>,
}

/// Parameters for uploading a file to a channel.
#[derive(Debug, Clone, Validate)]
pub struct UploadFileParams {
    /// File name reported to the server.
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Message text accompanying the file.
    #[validate(length(max = 4000))]
    pub content: Option<String>,
    /// Raw file contents.
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_content_rejected() {
        let params = CreateMessageParams::new("");
        assert!(params.validate().is_err());

        let params = CreateMessageParams::new("hi");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_oversized_message_content_rejected() {
        let params = CreateMessageParams::new("x".repeat(4001));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_message_list_limit_bounds() {
        let params = GetMessagesParams {
            limit: Some(0),
            ..GetMessagesParams::default()
        };
        assert!(params.validate().is_err());

        let params = GetMessagesParams {
            limit: Some(101),
            ..GetMessagesParams::default()
        };
        assert!(params.validate().is_err());

        let params = GetMessagesParams {
            limit: Some(100),
            ..GetMessagesParams::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_nonce_omitted_from_body_when_unset() {
        let params = CreateMessageParams::new("hi");
        let body = serde_json::to_string(&params).unwrap();
        assert_eq!(body, r#"{"content":"hi"}"#);
    }

    #[test]
    fn test_upload_requires_filename() {
        let params = UploadFileParams {
            filename: String::new(),
            content_type: None,
            content: None,
            data: Bytes::from_static(b"data"),
        };
        assert!(params.validate().is_err());
    }
}

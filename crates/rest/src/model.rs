//! Minimal API entities.
//!
//! Only the entities the dispatch core and its representative wrappers
//! touch; the full schema surface lives outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique id.
    pub id: u64,
    /// Display name.
    pub username: String,
    /// Avatar identifier, if set.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the account is a bot.
    #[serde(default)]
    pub bot: bool,
}

/// The authenticated account, as returned by the identity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// Unique id.
    pub id: u64,
    /// Display name.
    pub username: String,
    /// Avatar identifier, if set.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the account is a bot.
    #[serde(default)]
    pub bot: bool,
    /// Account email, only visible to the account itself.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the account email is verified.
    #[serde(default)]
    pub verified: Option<bool>,
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Unique id.
    pub id: u64,
    /// Channel name.
    #[serde(default)]
    pub name: Option<String>,
    /// Channel topic.
    #[serde(default)]
    pub topic: Option<String>,
}

/// A message in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id.
    pub id: u64,
    /// Channel the message was posted in.
    pub channel_id: u64,
    /// Message text.
    pub content: String,
    /// Author, absent on some system messages.
    #[serde(default)]
    pub author: Option<User>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Last edit time, if edited.
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

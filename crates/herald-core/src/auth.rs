//! Private channel authorization.
//!
//! Private channels are named `private-<topic>-<id>`. The topic decides
//! which check applies:
//!
//! - `user` - the id must be the requesting user's own id
//! - `connection` - the requesting user must hold a connection with that id
//!
//! Anything else, including names that do not parse, is denied.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Prefix shared by all private channel names.
pub const PRIVATE_PREFIX: &str = "private-";

static PRIVATE_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^private-([A-Za-z0-9_]+)-([0-9]+)$").expect("valid private channel pattern")
});

/// A user identifier. Compared as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for UserId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// The user requesting access to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self { id: id.into() }
    }

    /// The user's identifier.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }
}

/// Channel topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A user's own channel.
    User,
    /// A channel tied to one of the user's connections.
    Connection,
    /// Any other topic. Never authorized.
    Other(String),
}

impl Topic {
    /// Topic name as it appears in the channel.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Topic::User => "user",
            Topic::Connection => "connection",
            Topic::Other(name) => name,
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        match s {
            "user" => Topic::User,
            "connection" => Topic::Connection,
            other => Topic::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `private-<topic>-<id>` channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    topic: Topic,
    id: String,
}

impl ChannelName {
    /// Parse a private channel name.
    ///
    /// Returns `None` if the name is not of the form `private-<topic>-<id>`
    /// with a numeric id.
    #[must_use]
    pub fn parse(channel: &str) -> Option<Self> {
        let captures = PRIVATE_CHANNEL.captures(channel)?;
        Some(Self {
            topic: Topic::from(&captures[1]),
            id: captures[2].to_string(),
        })
    }

    /// The channel topic.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The channel id, as written.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PRIVATE_PREFIX}{}-{}", self.topic, self.id)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Authorization {
    success: bool,
}

impl Authorization {
    /// A granted authorization.
    pub fn granted() -> Self {
        Self { success: true }
    }

    /// A denied authorization.
    pub fn denied() -> Self {
        Self { success: false }
    }

    /// Whether access was granted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl From<bool> for Authorization {
    fn from(success: bool) -> Self {
        Self { success }
    }
}

/// Read-only lookup of the connections a user holds.
pub trait ConnectionDirectory: Send + Sync {
    /// Check if `user` holds the connection `connection_id`.
    fn has_connection(&self, user: &UserId, connection_id: &str) -> bool;
}

impl<D: ConnectionDirectory + ?Sized> ConnectionDirectory for Arc<D> {
    fn has_connection(&self, user: &UserId, connection_id: &str) -> bool {
        (**self).has_connection(user, connection_id)
    }
}

impl<D: ConnectionDirectory + ?Sized> ConnectionDirectory for &D {
    fn has_connection(&self, user: &UserId, connection_id: &str) -> bool {
        (**self).has_connection(user, connection_id)
    }
}

/// Decides whether a user may join a private channel.
#[derive(Debug, Clone)]
pub struct Authorizer<D> {
    directory: D,
}

impl<D: ConnectionDirectory> Authorizer<D> {
    /// Create an authorizer backed by a connection directory.
    #[must_use]
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Decide whether `user` may join `channel`.
    ///
    /// Malformed channel names and unknown topics are denied.
    pub fn authorize(&self, user: &User, channel: &str) -> Authorization {
        let Some(parsed) = ChannelName::parse(channel) else {
            debug!(channel = %channel, user = %user.id(), "Denied unrecognized channel");
            return Authorization::denied();
        };

        let success = match parsed.topic() {
            Topic::User => parsed.id() == user.id().as_str(),
            Topic::Connection => self.directory.has_connection(user.id(), parsed.id()),
            Topic::Other(_) => false,
        };

        debug!(
            channel = %channel,
            topic = %parsed.topic(),
            user = %user.id(),
            success,
            "Authorization decided"
        );

        Authorization::from(success)
    }
}

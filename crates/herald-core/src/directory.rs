//! In-memory record of which connections each user holds.

use crate::auth::{ConnectionDirectory, UserId};
use dashmap::{DashMap, DashSet};
use tracing::debug;

/// Concurrent user to connection map.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, DashSet<String>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user` holds `connection_id`.
    ///
    /// Returns `true` if the connection was not already recorded.
    pub fn open_connection(&self, user: &UserId, connection_id: &str) -> bool {
        let inserted = self
            .users
            .entry(user.clone())
            .or_default()
            .insert(connection_id.to_string());

        if inserted {
            debug!(user = %user, connection = %connection_id, "Connection opened");
        }
        inserted
    }

    /// Forget that `user` holds `connection_id`.
    ///
    /// Returns `true` if the connection was recorded. Users left with no
    /// connections are dropped.
    pub fn close_connection(&self, user: &UserId, connection_id: &str) -> bool {
        let Some(connections) = self.users.get(user) else {
            return false;
        };

        let removed = connections.remove(connection_id).is_some();
        let now_empty = connections.is_empty();
        drop(connections); // Release the read guard before removing

        if now_empty {
            self.users.remove_if(user, |_, c| c.is_empty());
        }

        if removed {
            debug!(user = %user, connection = %connection_id, "Connection closed");
        }
        removed
    }

    /// Connections held by `user`, sorted.
    #[must_use]
    pub fn connections(&self, user: &UserId) -> Vec<String> {
        let mut connections: Vec<String> = self
            .users
            .get(user)
            .map(|c| c.iter().map(|id| id.key().clone()).collect())
            .unwrap_or_default();
        connections.sort_unstable();
        connections
    }

    /// Number of users holding at least one connection.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Total number of recorded connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.users.iter().map(|c| c.len()).sum()
    }
}

impl ConnectionDirectory for InMemoryDirectory {
    fn has_connection(&self, user: &UserId, connection_id: &str) -> bool {
        self.users
            .get(user)
            .is_some_and(|connections| connections.contains(connection_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_connection() {
        let directory = InMemoryDirectory::new();
        let user = UserId::from("42");

        assert!(directory.open_connection(&user, "7"));
        assert!(!directory.open_connection(&user, "7"));
        assert!(directory.has_connection(&user, "7"));
        assert_eq!(directory.connection_count(), 1);

        assert!(directory.close_connection(&user, "7"));
        assert!(!directory.close_connection(&user, "7"));
        assert!(!directory.has_connection(&user, "7"));
        assert_eq!(directory.user_count(), 0);
    }

    #[test]
    fn test_connections_sorted() {
        let directory = InMemoryDirectory::new();
        let user = UserId::from("1");

        directory.open_connection(&user, "9");
        directory.open_connection(&user, "3");
        directory.open_connection(&UserId::from("2"), "5");

        assert_eq!(directory.connections(&user), vec!["3", "9"]);
        assert_eq!(directory.user_count(), 2);
        assert_eq!(directory.connection_count(), 3);
    }

    #[test]
    fn test_connections_are_per_user() {
        let directory = InMemoryDirectory::new();
        directory.open_connection(&UserId::from("1"), "7");

        assert!(!directory.has_connection(&UserId::from("2"), "7"));
        assert!(!directory.close_connection(&UserId::from("2"), "7"));
        assert!(directory.connections(&UserId::from("2")).is_empty());
    }
}

//! Username lookup.

use std::collections::HashSet;
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Answers whether a username is registered.
pub trait UserDirectory: Send + Sync + Debug {
    /// True if `username` may log in.
    fn exists(&self, username: &str) -> bool;
}

/// A fixed set of usernames, typically taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashSet<String>,
}

impl StaticUserDirectory {
    /// Creates a directory holding `users`.
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of registered usernames.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when no username is registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticUserDirectory {
    #[instrument(skip(self))]
    fn exists(&self, username: &str) -> bool {
        let found = self.users.contains(username);
        debug!(found, "User lookup");
        found
    }
}

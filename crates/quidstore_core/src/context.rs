//! Actor context for change logging.
//!
//! Update log lines name who was affected. Documents carry raw `userId`
//! and `serverId` strings; a [`ContextResolver`] may turn them into
//! readable labels (a user tag, a server name). The store never looks
//! these up itself.

use crate::document::Document;
use serde_json::Value;
use std::fmt;

/// Maps raw user and server ids to display labels.
pub trait ContextResolver: Send + Sync {
    /// Returns a label for the user id, or `None` to log the raw id.
    fn user_label(&self, user_id: &str) -> Option<String> {
        let _ = user_id;
        None
    }

    /// Returns a label for the server id, or `None` to log the raw id.
    fn server_label(&self, server_id: &str) -> Option<String> {
        let _ = server_id;
        None
    }
}

/// Resolver that logs raw ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawIds;

impl ContextResolver for RawIds {}

/// Who a document belongs to, for log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    /// User label or raw id.
    pub user: Option<String>,
    /// Server label or raw id.
    pub server: Option<String>,
}

impl ActorContext {
    /// Resolves the context of `document`.
    pub fn resolve(document: &Document, resolver: &dyn ContextResolver) -> Self {
        let raw = |field: &str| {
            document
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };
        Self {
            user: raw("userId").map(|id| resolver.user_label(id).unwrap_or_else(|| id.to_string())),
            server: raw("serverId")
                .map(|id| resolver.server_label(id).unwrap_or_else(|| id.to_string())),
        }
    }
}

impl fmt::Display for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user, &self.server) {
            (Some(user), Some(server)) => write!(f, "{user} in {server}"),
            (Some(user), None) => f.write_str(user),
            (None, Some(server)) => write!(f, "server {server}"),
            (None, None) => f.write_str("-"),
        }
    }
}

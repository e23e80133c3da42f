//! Conversation keys
//!
//! A direct conversation is identified by the unordered pair of its participants'
//! connection ids. The key is the two ids sorted and joined with `_`, which is also
//! the `userToken` layout of existing `data.json` files.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '_';

/// Stable, order-independent identifier for a pair of participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Derive the key shared by `a` and `b`. `derive(a, b) == derive(b, a)`.
    pub fn derive(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut key = String::with_capacity(low.len() + high.len() + 1);
        key.push_str(low);
        key.push(SEPARATOR);
        key.push_str(high);
        Self(key)
    }

    /// True when both participants are the same id (a note-to-self).
    pub fn is_self_key(&self) -> bool {
        let mut parts = self.0.splitn(2, SEPARATOR);
        matches!((parts.next(), parts.next()), (Some(a), Some(b)) if a == b)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.0
    }
}

//! Usage context classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why and where an editable surface is used.
///
/// Assigned once at discovery and fixed for the lifetime of the surface.
/// Selects the instruction variant sent to the rewrite endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageContext {
    /// A brand new top-level comment.
    NewEntry,
    /// An existing comment opened for editing.
    EditExisting,
    /// A reply inside a thread.
    ThreadedReply,
}

impl UsageContext {
    pub const ALL: [UsageContext; 3] = [
        UsageContext::NewEntry,
        UsageContext::EditExisting,
        UsageContext::ThreadedReply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageContext::NewEntry => "new_entry",
            UsageContext::EditExisting => "edit_existing",
            UsageContext::ThreadedReply => "threaded_reply",
        }
    }
}

impl fmt::Display for UsageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

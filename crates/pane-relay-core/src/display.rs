//! Messages delivered to a pane's display.

use serde::{Deserialize, Serialize};

/// Display message for one pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DisplayMsg {
    /// Raw session output, exactly as received.
    Output(String),
    /// Relay status line. Shown to the user, never re-scanned or stored.
    Status(String),
    /// The session behind the pane ended.
    Exited,
}

//! PTY host for relay panes.
//!
//! Provides:
//! - `PtyService` - Spawn and drive one login shell per pane
//! - `Utf8Decoder` - Turn raw PTY reads into text
//! - Shell detection

pub mod decode;
pub mod service;
pub mod shell;

pub use decode::Utf8Decoder;
pub use service::{PtyError, PtyService};
pub use shell::{ShellCommand, interactive_shell, resolve_executable_path};

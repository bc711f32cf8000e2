//! Core of the pane relay protocol.
//!
//! This crate provides the fundamental building blocks:
//! - `ansi` - CSI/OSC escape stripping
//! - `parser` - `@targets command` grammar and target resolution
//! - `InputInterceptor` - Per-pane keystroke state machine
//! - `OutputScanner` - Per-pane passive line scanner
//! - `OutputHistory` - Display broadcast + capped history
//! - `WorkspaceDirectory` - In-memory pane directory
//! - Writer, directory and dispatch log traits

pub mod ansi;
pub mod config;
pub mod directory;
pub mod display;
pub mod history;
pub mod interceptor;
pub mod parser;
pub mod scanner;
pub mod traits;

pub use config::RelayConfig;
pub use directory::WorkspaceDirectory;
pub use display::DisplayMsg;
pub use history::OutputHistory;
pub use interceptor::{InputAction, InputInterceptor, InputMode};
pub use parser::{ParsedRelayCommand, TargetSet};
pub use scanner::OutputScanner;
pub use traits::{
    DispatchLog, DispatchLogStore, DispatchOutcome, DispatchStatus, PaneDirectory, SessionId,
    SessionWriter,
};

//! Relay dispatch.
//!
//! Provides:
//! - `DispatchOrchestrator` - Fan a command out to target sessions
//! - `ManualSender` - Relay-panel sends with confirmation
//! - Confirmation trait

pub mod confirm;
pub mod manual;
pub mod orchestrator;

pub use confirm::{AutoConfirm, ConfirmError, Confirmation, DispatchConfirmer};
pub use manual::ManualSender;
pub use orchestrator::{DISPATCH_FAILED, DispatchError, DispatchOrchestrator};

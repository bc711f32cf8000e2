//! Per-pane relay state and dispatch log storage.
//!
//! Provides:
//! - `RelayManager` - Route pane input and output through the relay
//! - Storage implementations (memory)

pub mod manager;
pub mod storage;

pub use manager::{DispatchHandle, RelayError, RelayManager};

//! Small, dependency-light types shared by every broker crate.
//!
//! Kept separate from `broker-core` so that the wire-level identifier type and
//! the generic state-machine helper can be depended on without pulling in the
//! pool, proxy, or cache machinery.

pub mod state_machine;
pub mod tool_id;

pub use state_machine::StateMachine;
pub use tool_id::{ToolId, ToolIdParseError};

//! Agent system for Cuttlefish
//!
//! ## Orchestrator (the agent loop)
//! - `Orchestrator` - Streams completions, dispatches tool actions, retries empty results
//! - `OrchestratorServices` - Shared dependencies of every run
//!
//! ## Coordination
//! - `CancellationRegistry` - One cancel handle per generating conversation
//! - `ApprovalGate` - Human approval rendezvous for privileged tool actions
//! - `ToolInstanceCache` - Per-run tool instances, shut down together
//!
//! ## Protocol
//! - `action` - Action directive detection and decoding
//! - `prompt` - System prompt rendering, history conversion, observations

pub mod action;
pub mod approval;
pub mod cancellation;
pub mod error;
pub mod events;
pub mod instances;
pub mod orchestrator;
pub mod prompt;
mod stream;

pub use action::{Action, ActionError};
pub use approval::{ApprovalError, ApprovalGate, ApprovalHandle, ApprovalRequest};
pub use cancellation::{CancellationRegistry, RunRegistration};
pub use error::GenerationError;
pub use events::{AppEvent, EventSender};
pub use instances::ToolInstanceCache;
pub use orchestrator::{Orchestrator, OrchestratorServices};

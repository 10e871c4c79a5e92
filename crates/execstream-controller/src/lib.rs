//! Execution procedures for the agent execution service.
//!
//! Provides:
//! - `ExecutionController` - Create, Get, Delete, ListBySession,
//!   UpdateStatus and Subscribe, each a `Pipeline` of steps
//! - `slugify` - Slug derivation used on create

pub mod controller;
pub mod create;
mod delete;
mod get;
mod list_by_session;
pub mod slug;
pub mod steps;
pub mod subscribe;
pub mod update_status;

pub use controller::ExecutionController;
pub use create::EXECUTION_ID_PREFIX;
pub use slug::slugify;
pub use subscribe::{Baseline, StreamEnd, SubscribeOutcome};
pub use update_status::UpdateStatusInput;

//! The reminder dispatch engine.
//!
//! A cycle walks every [`ActionType`](waterme_core::ActionType): scan due items,
//! group them per user, filter by the user's notification config, compose a
//! message, fan it out to the push provider and reconcile the outcome.

pub mod composer;
mod deadline;
pub mod dispatcher;
pub mod policy;
pub mod reconciler;
pub mod scanner;
pub mod service;
pub mod stats;
pub mod worker;

pub use composer::{MessageComposer, MessageTemplate, RenderedMessage, TemplatePool, TemplateRegistry};
pub use dispatcher::BatchDispatcher;
pub use policy::{PolicyDecision, Recipients, SkipReason};
pub use service::{DispatchSettings, ReminderService, UserOutcome};
pub use stats::{DispatchStats, StatsSnapshot};
pub use worker::{run, CycleOutcome, DispatchWorker};

//! Durable scheduler: at-least-once timed firing of named actions.

mod registry;
mod runner;

pub use registry::{action_types, ActionHandler, HandlerRegistry};
pub use runner::{AlwaysLeader, InboxSweep, LeaderGate, SchedulerConfig, SchedulerRunner};

//! Request lifecycle decisions: who may mutate a request, whether it is complete, and
//! which state it moves to. Everything here is pure; persistence and notification live
//! in the orchestration layer.

pub mod authorization;
pub mod completeness;
pub mod engine;

pub use authorization::{can_mutate, Caller, ADMIN_ROLE};
pub use completeness::{first_gap, is_complete, CompletenessGap};
pub use engine::{compute_next_state, LifecycleEngine, UpdatePlan};

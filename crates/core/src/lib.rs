pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod intake;
pub mod lifecycle;
pub mod notify;
pub mod retention;

pub use domain::request::{
    Approval, FileAttachment, NewRequest, Purchase, RequestId, RequestListing, RequestQuery,
    RequestRecord, RequestState, RequestSummary, RequestUpdate, ValidatedUpdate,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{IdentityError, IdentityResolver, StaticTokenResolver};
pub use lifecycle::{
    can_mutate, compute_next_state, is_complete, Caller, CompletenessGap, LifecycleEngine,
    UpdatePlan, ADMIN_ROLE,
};
pub use notify::{NotificationDispatcher, NotificationError, StateChangeNotice};
pub use retention::RetentionPolicy;

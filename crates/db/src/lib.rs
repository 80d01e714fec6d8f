pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod retention;

pub use connection::{connect_with_settings, DbPool};
pub use repositories::{
    InMemoryRequestRepository, RepositoryError, RequestRepository, SqlRequestRepository,
    UpdateOutcome,
};
pub use retention::{run_sweep, SweepReport};

//! PostgreSQL implementations of the store ports.
//!
//! Hand-written SQL per repository; the entity count is small enough
//! that an ORM would cost more than it saves.

mod alert_store;
mod guardian_store;
mod inbox;
mod incident_store;
mod leader;
mod outbox;
mod scheduler_store;
mod user_store;

pub use alert_store::{PgAlertStore, PgCallAttemptStore};
pub use guardian_store::PgGuardianStore;
pub use inbox::PgInboxStore;
pub use incident_store::PgIncidentStore;
pub use leader::PgLeaderGate;
pub use outbox::PgOutboxStore;
pub use scheduler_store::PgScheduledActionStore;
pub use user_store::PgUserStore;

//! Foundation value objects shared across the domain.

mod errors;
mod ids;
mod phone;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AlertId, CallAttemptId, IncidentId, ScheduledActionId, UserId};
pub use phone::PhoneNumber;
pub use timestamp::Timestamp;

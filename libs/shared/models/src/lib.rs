pub mod auth;
pub mod error;
pub mod scheduling;

pub use auth::{permissions_for, Permission, Requester, Role, User};
pub use error::AppError;
pub use scheduling::{within_conflict_window, DayOfWeek};

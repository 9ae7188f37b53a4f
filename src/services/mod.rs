//! Domain services. Every operation takes the caller as an explicit `&AuthUser`, asks the
//! permission evaluator, and performs its writes plus the matching audit entry inside one
//! unit of work.

use crate::{error::AppError, permissions::Decision};

pub mod audit;
pub mod projects;
pub mod users;

pub use audit::AuditService;
pub use projects::ProjectService;
pub use users::UserService;

/// Turns a decision into a 403 when it denies.
fn permit(decision: Decision) -> Result<(), AppError> {
    match decision {
        Decision::Allow | Decision::Filter(_) => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(reason, "permission denied");
            Err(AppError::permission(reason))
        }
    }
}

/// Turns a decision into a 404 when it denies, so out-of-scope rows look absent.
fn reveal(decision: Decision) -> Result<(), AppError> {
    match decision {
        Decision::Allow | Decision::Filter(_) => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(reason, "hiding out-of-scope record");
            Err(AppError::NotFound)
        }
    }
}

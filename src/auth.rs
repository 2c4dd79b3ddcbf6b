// Identity/role gate for the revenue API
//
// Callers authenticate with `Authorization: Bearer <token>`; tokens and their
// roles come from `AppConfig::auth`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};

use crate::config::Role;
use crate::error::AppError;
use crate::routes::AppState;

/// Authenticated caller, stored in request extensions by `require_auth`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub name: String,
    pub role: Role,
}

impl Caller {
    pub fn ensure_can_write(&self) -> Result<(), AppError> {
        if self.role.can_write() {
            Ok(())
        } else {
            warn!(caller = %self.name, "Write attempted by read-only caller");
            Err(AppError::Forbidden(
                "Your role is not allowed to modify revenue records".to_string(),
            ))
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".to_string()))?;

    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;

    let caller = state
        .config
        .find_token(token)
        .map(|t| Caller {
            name: t.name.clone(),
            role: t.role,
        })
        .ok_or_else(|| {
            warn!("Rejected unknown API token");
            AppError::Unauthorized("Invalid token".to_string())
        })?;

    trace!(caller = %caller.name, role = ?caller.role, "Authenticated request");
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_cannot_write() {
        let client = Caller {
            name: "dashboard".to_string(),
            role: Role::Client,
        };
        assert!(matches!(client.ensure_can_write(), Err(AppError::Forbidden(_))));

        let employee = Caller {
            name: "bookkeeper".to_string(),
            role: Role::Employee,
        };
        assert!(employee.ensure_can_write().is_ok());
    }
}

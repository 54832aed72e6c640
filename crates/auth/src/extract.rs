//! Axum extractor resolving the bearer token to a user.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use folio_db::Db;
use folio_http::error::AppError;

use crate::role::Role;

/// The authenticated user for the current request.
///
/// Extracting this from a handler makes the endpoint require
/// authentication: requests without a valid `Authorization: Bearer` token
/// are rejected with 403 before the handler runs.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub bio: String,
    pub avatar_url: Option<String>,
}

impl CurrentUser {
    /// Require an exact role.
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("requires the {role} role")))
        }
    }

    /// Require one of several roles.
    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            let allowed: Vec<&str> = roles.iter().map(Role::as_str).collect();
            Err(AppError::forbidden(format!(
                "requires one of the following roles: {}",
                allowed.join(", ")
            )))
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    role: String,
    bio: String,
    avatar_url: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Db: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db = Db::from_ref(state);

        let token = bearer_token(parts)
            .ok_or_else(|| AppError::forbidden("authentication credentials were not provided"))?
            .to_string();

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.username, u.email, u.role, u.bio, u.avatar_url
             FROM auth_user u
             JOIN auth_token t ON t.user_id = u.id
             WHERE t.key = ?1",
        )
        .bind(&token)
        .fetch_optional(db.pool())
        .await?;

        let row = row.ok_or_else(|| {
            tracing::debug!("bearer token did not match any session");
            AppError::forbidden("invalid authentication token")
        })?;

        let role = Role::parse(&row.role).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "unknown role '{}' stored for user {}",
                row.role,
                row.id
            ))
        })?;

        Ok(CurrentUser {
            id: row.id,
            username: row.username,
            email: row.email,
            role,
            bio: row.bio,
            avatar_url: row.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_guards() {
        let user = CurrentUser {
            id: 1,
            username: "nadia".to_string(),
            email: None,
            role: Role::Librarian,
            bio: String::new(),
            avatar_url: None,
        };

        assert!(user.require_role(Role::Librarian).is_ok());
        assert!(user.require_role(Role::Admin).is_err());
        assert!(user.require_any(&[Role::Admin, Role::Librarian]).is_ok());
        assert!(user.require_any(&[Role::Admin]).is_err());
    }
}

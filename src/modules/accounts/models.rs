use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registration payload. The password is write-only: it is hashed on
/// arrival and never serialized back.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// Public view of a user account.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub role: String,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInput {
    pub role: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub bio: String,
    pub avatar_url: Option<String>,
}

impl UserRow {
    pub fn into_profile(self) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            email: self.email,
            bio: self.bio,
            avatar_url: self.avatar_url,
            role: self.role,
        }
    }
}

use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;

use folio_auth::{CurrentUser, Role};
use folio_db::Db;
use folio_http::error::AppError;

use super::models::{LoginInput, Profile, ProfileUpdate, RegisterInput, RoleInput, UserRow};
use crate::utils;

#[derive(Clone)]
pub(crate) struct AccountsState {
    pub db: Db,
}

impl FromRef<AccountsState> for Db {
    fn from_ref(state: &AccountsState) -> Db {
        state.db.clone()
    }
}

pub(crate) fn router(db: Db) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(profile).put(update_profile))
        .route("/users/{id}/role", put(set_role))
        .with_state(AccountsState { db })
}

const SELECT_USER: &str =
    "SELECT id, username, email, password_hash, role, bio, avatar_url FROM auth_user";

async fn fetch_by_username(db: &Db, username: &str) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE username = ?1"))
        .bind(username)
        .fetch_optional(db.pool())
        .await?;
    Ok(user)
}

/// Return the user's token, issuing one on first use.
async fn get_or_create_token(db: &Db, user_id: i64) -> Result<String, AppError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT key FROM auth_token WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(db.pool())
            .await?;

    if let Some((key,)) = existing {
        return Ok(key);
    }

    let key = folio_auth::generate_token();
    sqlx::query("INSERT INTO auth_token (key, user_id, created_at) VALUES (?1, ?2, ?3)")
        .bind(&key)
        .bind(user_id)
        .bind(utils::now_rfc3339())
        .execute(db.pool())
        .await?;
    Ok(key)
}

async fn register(
    State(state): State<AccountsState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AppError::field_validation("username", "may not be blank"));
    }
    if input.password.len() < 8 {
        return Err(AppError::field_validation(
            "password",
            "must contain at least 8 characters",
        ));
    }

    if fetch_by_username(&state.db, username).await?.is_some() {
        return Err(AppError::conflict(
            vec![json!({"field": "username", "error": "already taken"})],
            "a user with that username already exists",
        ));
    }

    let password_hash = folio_auth::hash_password(&input.password)?;
    let now = utils::now_rfc3339();

    let result = sqlx::query(
        "INSERT INTO auth_user (username, email, password_hash, role, bio, avatar_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(username)
    .bind(&input.email)
    .bind(&password_hash)
    .bind(Role::Member.as_str())
    .bind(input.bio.as_deref().unwrap_or(""))
    .bind(&input.avatar_url)
    .bind(&now)
    .execute(state.db.pool())
    .await?;

    let user_id = result.last_insert_rowid();
    let token = get_or_create_token(&state.db, user_id).await?;

    tracing::info!(username, user_id, "account registered");

    let profile = Profile {
        id: user_id,
        username: username.to_string(),
        email: input.email,
        bio: input.bio.unwrap_or_default(),
        avatar_url: input.avatar_url,
        role: Role::Member.as_str().to_string(),
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": profile })),
    ))
}

async fn login(
    State(state): State<AccountsState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = fetch_by_username(&state.db, input.username.trim()).await?;

    let user = match user {
        Some(user) if folio_auth::verify_password(&input.password, &user.password_hash) => user,
        // Same response for unknown user and wrong password.
        _ => {
            return Err(AppError::validation(
                vec![json!({"error": "Invalid credentials"})],
                "Invalid credentials",
            ))
        }
    };

    let token = get_or_create_token(&state.db, user.id).await?;

    Ok(Json(json!({ "token": token, "username": user.username })))
}

async fn profile(user: CurrentUser) -> Json<Profile> {
    Json(Profile {
        id: user.id,
        username: user.username,
        email: user.email,
        bio: user.bio,
        avatar_url: user.avatar_url,
        role: user.role.as_str().to_string(),
    })
}

async fn update_profile(
    State(state): State<AccountsState>,
    user: CurrentUser,
    Json(input): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AppError> {
    let email = input.email.or(user.email);
    let bio = input.bio.unwrap_or(user.bio);
    let avatar_url = input.avatar_url.or(user.avatar_url);

    sqlx::query(
        "UPDATE auth_user SET email = ?1, bio = ?2, avatar_url = ?3, updated_at = ?4 WHERE id = ?5",
    )
    .bind(&email)
    .bind(&bio)
    .bind(&avatar_url)
    .bind(utils::now_rfc3339())
    .bind(user.id)
    .execute(state.db.pool())
    .await?;

    Ok(Json(Profile {
        id: user.id,
        username: user.username,
        email,
        bio,
        avatar_url,
        role: user.role.as_str().to_string(),
    }))
}

async fn set_role(
    State(state): State<AccountsState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<RoleInput>,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_role(Role::Admin)?;

    let role = Role::parse(&input.role)
        .ok_or_else(|| AppError::field_validation("role", "must be admin, librarian, or member"))?;

    let result = sqlx::query("UPDATE auth_user SET role = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(role.as_str())
        .bind(utils::now_rfc3339())
        .bind(id)
        .execute(state.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("no user with id {id}")));
    }

    tracing::info!(admin = %user.username, user_id = id, role = %role, "role updated");

    Ok(Json(json!({ "id": id, "role": role })))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::modules::testing::{json_body, register_user, send, set_role, test_app};

    #[tokio::test]
    async fn register_returns_token_and_profile() {
        let (app, _db) = test_app().await;

        let response = send(
            &app,
            Method::POST,
            "/api/accounts/register",
            None,
            Some(json!({
                "username": "amelia",
                "password": "correct-horse",
                "bio": "reader of maps",
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert!(body["token"].as_str().unwrap().starts_with("folio-"));
        assert_eq!(body["user"]["username"], "amelia");
        assert_eq!(body["user"]["bio"], "reader of maps");
        assert_eq!(body["user"]["role"], "member");
        // The password never comes back in any shape.
        assert!(body["user"].get("password").is_none());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_username() {
        let (app, _db) = test_app().await;
        register_user(&app, "amelia").await;

        let response = send(
            &app,
            Method::POST,
            "/api/accounts/register",
            None,
            Some(json!({ "username": "amelia", "password": "correct-horse" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (app, _db) = test_app().await;

        let response = send(
            &app,
            Method::POST,
            "/api/accounts/register",
            None,
            Some(json!({ "username": "amelia", "password": "short" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["details"][0]["field"], "password");
    }

    #[tokio::test]
    async fn login_returns_existing_token() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;

        let response = send(
            &app,
            Method::POST,
            "/api/accounts/login",
            None,
            Some(json!({ "username": "amelia", "password": "correct-horse" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["token"], token.as_str());
        assert_eq!(body["username"], "amelia");
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let (app, _db) = test_app().await;
        register_user(&app, "amelia").await;

        for payload in [
            json!({ "username": "amelia", "password": "wrong-password" }),
            json!({ "username": "nobody", "password": "correct-horse" }),
        ] {
            let response =
                send(&app, Method::POST, "/api/accounts/login", None, Some(payload)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["error"]["message"], "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn profile_requires_authentication() {
        let (app, _db) = test_app().await;

        let response = send(&app, Method::GET, "/api/accounts/profile", None, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(
            &app,
            Method::GET,
            "/api/accounts/profile",
            Some("folio-bogus"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn profile_roundtrip() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;

        let response = send(
            &app,
            Method::PUT,
            "/api/accounts/profile",
            Some(&token),
            Some(json!({ "email": "amelia@example.com", "bio": "cartographer" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/api/accounts/profile", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "amelia");
        assert_eq!(body["email"], "amelia@example.com");
        assert_eq!(body["bio"], "cartographer");
    }

    #[tokio::test]
    async fn role_assignment_is_admin_only() {
        let (app, db) = test_app().await;
        let admin_token = register_user(&app, "root").await;
        set_role(&db, "root", "admin").await;
        let member_token = register_user(&app, "amelia").await;

        // A member may not change roles.
        let response = send(
            &app,
            Method::PUT,
            "/api/accounts/users/1/role",
            Some(&member_token),
            Some(json!({ "role": "librarian" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // The admin promotes the member to librarian.
        let response = send(
            &app,
            Method::PUT,
            "/api/accounts/users/2/role",
            Some(&admin_token),
            Some(json!({ "role": "librarian" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, Method::GET, "/api/accounts/profile", Some(&member_token), None)
            .await;
        let body = json_body(response).await;
        assert_eq!(body["role"], "librarian");
    }

    #[tokio::test]
    async fn role_assignment_validates_input() {
        let (app, db) = test_app().await;
        let admin_token = register_user(&app, "root").await;
        set_role(&db, "root", "admin").await;

        let response = send(
            &app,
            Method::PUT,
            "/api/accounts/users/1/role",
            Some(&admin_token),
            Some(json!({ "role": "superuser" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            Method::PUT,
            "/api/accounts/users/999/role",
            Some(&admin_token),
            Some(json!({ "role": "member" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

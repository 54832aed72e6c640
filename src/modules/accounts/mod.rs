pub mod models;
pub mod routes;

use async_trait::async_trait;
use axum::Router;
use folio_auth::Role;
use folio_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use crate::utils;

/// Accounts module: registration, login, profiles, and role assignment.
pub struct AccountsModule;

impl AccountsModule {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for AccountsModule {
    fn name(&self) -> &'static str {
        "accounts"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "accounts module initialized"
        );
        Ok(())
    }

    fn routes(&self, ctx: &InitCtx<'_>) -> Router {
        routes::router(ctx.db.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/register": {
                    "post": {
                        "summary": "Register a new account",
                        "tags": ["Accounts"],
                        "responses": {
                            "201": {
                                "description": "Account created; returns the profile and a bearer token",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/AuthResponse" }
                                    }
                                }
                            },
                            "400": {
                                "description": "Validation error",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            },
                            "409": {
                                "description": "Username already taken",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/login": {
                    "post": {
                        "summary": "Exchange credentials for a bearer token",
                        "tags": ["Accounts"],
                        "responses": {
                            "200": {
                                "description": "Token and username",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/AuthResponse" }
                                    }
                                }
                            },
                            "400": {
                                "description": "Invalid credentials",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/profile": {
                    "get": {
                        "summary": "Get the authenticated user's profile",
                        "tags": ["Accounts"],
                        "responses": {
                            "200": {
                                "description": "Profile",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Profile" }
                                    }
                                }
                            },
                            "403": {
                                "description": "Missing or invalid token",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    },
                    "put": {
                        "summary": "Update email, bio, or avatar",
                        "tags": ["Accounts"],
                        "responses": {
                            "200": {
                                "description": "Updated profile",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Profile" }
                                    }
                                }
                            }
                        }
                    }
                },
                "/users/{id}/role": {
                    "put": {
                        "summary": "Assign a role to a user (admin only)",
                        "tags": ["Accounts"],
                        "responses": {
                            "200": { "description": "Role updated" },
                            "403": {
                                "description": "Caller is not an admin",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            },
                            "404": {
                                "description": "Unknown user",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Profile": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "username": { "type": "string" },
                            "email": { "type": "string", "nullable": true },
                            "bio": { "type": "string" },
                            "avatar_url": { "type": "string", "nullable": true },
                            "role": { "type": "string", "enum": ["admin", "librarian", "member"] }
                        },
                        "required": ["id", "username", "bio", "role"]
                    },
                    "AuthResponse": {
                        "type": "object",
                        "properties": {
                            "token": { "type": "string" },
                            "username": { "type": "string" },
                            "user": { "$ref": "#/components/schemas/Profile" }
                        },
                        "required": ["token"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE auth_user (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'member',
                    bio TEXT NOT NULL DEFAULT '',
                    avatar_url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE auth_token (
                    key TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES auth_user(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL
                );
                "#,
        }]
    }

    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if let Some(admin) = &ctx.settings.auth.bootstrap_admin {
            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM auth_user WHERE username = ?1")
                    .bind(&admin.username)
                    .fetch_optional(ctx.db.pool())
                    .await?;

            if existing.is_none() {
                let password_hash = folio_auth::hash_password(&admin.password)?;
                let now = utils::now_rfc3339();
                sqlx::query(
                    "INSERT INTO auth_user (username, password_hash, role, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                )
                .bind(&admin.username)
                .bind(&password_hash)
                .bind(Role::Admin.as_str())
                .bind(&now)
                .execute(ctx.db.pool())
                .await?;

                tracing::info!(username = %admin.username, "bootstrap admin created");
            }
        }

        tracing::info!(module = self.name(), "accounts module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "accounts module stopped");
        Ok(())
    }
}

/// Create a new instance of the accounts module
pub fn create_module() -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(AccountsModule::new())
}

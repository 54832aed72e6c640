pub mod models;
pub mod routes;

use async_trait::async_trait;
use axum::Router;
use folio_kernel::{InitCtx, Migration, Module};
use serde_json::json;

/// Blog module: posts, tags, and comments.
pub struct BlogModule;

impl BlogModule {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for BlogModule {
    fn name(&self) -> &'static str {
        "blog"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "blog module initialized"
        );
        Ok(())
    }

    fn routes(&self, ctx: &InitCtx<'_>) -> Router {
        routes::router(ctx.db.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/posts": {
                    "get": {
                        "summary": "List posts, newest first",
                        "description": "Supports search over title and content, a tag filter, and limit/offset pagination",
                        "tags": ["Blog"],
                        "responses": {
                            "200": {
                                "description": "Posts",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Post" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a post",
                        "tags": ["Blog"],
                        "responses": {
                            "201": { "description": "Created post with tags" },
                            "403": { "description": "Authentication required" }
                        }
                    }
                },
                "/posts/{id}": {
                    "get": { "summary": "Post with tags and comments", "tags": ["Blog"], "responses": { "200": { "description": "Post detail" }, "404": { "description": "Unknown post" } } },
                    "put": { "summary": "Update a post (author only)", "tags": ["Blog"], "responses": { "200": { "description": "Updated" }, "403": { "description": "Not the author" } } },
                    "delete": { "summary": "Delete a post (author only)", "tags": ["Blog"], "responses": { "204": { "description": "Deleted" }, "403": { "description": "Not the author" } } }
                },
                "/posts/{id}/comments": {
                    "post": { "summary": "Comment on a post", "tags": ["Blog"], "responses": { "201": { "description": "Created comment" }, "404": { "description": "Unknown post" } } }
                },
                "/comments/{id}": {
                    "put": { "summary": "Edit a comment (author only)", "tags": ["Blog"], "responses": { "200": { "description": "Updated" }, "403": { "description": "Not the author" } } },
                    "delete": { "summary": "Delete a comment (author only)", "tags": ["Blog"], "responses": { "204": { "description": "Deleted" } } }
                },
                "/tags/{tag}": {
                    "get": { "summary": "Posts carrying a tag, newest first", "tags": ["Blog"], "responses": { "200": { "description": "Posts" } } }
                }
            },
            "components": {
                "schemas": {
                    "Post": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "title": { "type": "string" },
                            "content": { "type": "string" },
                            "author_id": { "type": "integer" },
                            "author": { "type": "string" },
                            "created_at": { "type": "string", "format": "date-time" },
                            "updated_at": { "type": "string", "format": "date-time" },
                            "tags": { "type": "array", "items": { "type": "string" } },
                            "comments": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/Comment" }
                            }
                        },
                        "required": ["id", "title", "content", "author_id", "author"]
                    },
                    "Comment": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "post_id": { "type": "integer" },
                            "author_id": { "type": "integer" },
                            "author": { "type": "string" },
                            "content": { "type": "string" },
                            "created_at": { "type": "string", "format": "date-time" }
                        },
                        "required": ["id", "post_id", "author_id", "author", "content"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE post (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    author_id INTEGER NOT NULL REFERENCES auth_user(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE post_tag (
                    post_id INTEGER NOT NULL REFERENCES post(id) ON DELETE CASCADE,
                    tag TEXT NOT NULL,
                    PRIMARY KEY (post_id, tag)
                );
                CREATE TABLE comment (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id INTEGER NOT NULL REFERENCES post(id) ON DELETE CASCADE,
                    author_id INTEGER NOT NULL REFERENCES auth_user(id) ON DELETE CASCADE,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX comment_post_idx ON comment(post_id);
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "blog module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "blog module stopped");
        Ok(())
    }
}

/// Create a new instance of the blog module
pub fn create_module() -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(BlogModule::new())
}

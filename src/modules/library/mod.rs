pub mod models;
pub mod routes;

use async_trait::async_trait;
use axum::Router;
use folio_kernel::{InitCtx, Migration, Module};
use serde_json::json;

/// Library module: libraries, holdings, librarian assignment, and
/// role-gated dashboards.
pub struct LibraryModule;

impl LibraryModule {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Module for LibraryModule {
    fn name(&self) -> &'static str {
        "library"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "library module initialized"
        );
        Ok(())
    }

    fn routes(&self, ctx: &InitCtx<'_>) -> Router {
        routes::router(ctx.db.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List libraries",
                        "tags": ["Library"],
                        "responses": {
                            "200": {
                                "description": "Libraries",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Library" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a library (admin only)",
                        "tags": ["Library"],
                        "responses": {
                            "201": { "description": "Created library" },
                            "403": { "description": "Caller is not an admin" },
                            "409": { "description": "Name already exists" }
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Library detail with holdings and librarian",
                        "tags": ["Library"],
                        "responses": {
                            "200": {
                                "description": "Library detail",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/LibraryDetail" }
                                    }
                                }
                            },
                            "404": { "description": "Unknown library" }
                        }
                    },
                    "delete": { "summary": "Delete a library (admin only)", "tags": ["Library"], "responses": { "204": { "description": "Deleted" } } }
                },
                "/{id}/books": {
                    "get": { "summary": "Books held by a library", "tags": ["Library"], "responses": { "200": { "description": "Books" } } },
                    "post": { "summary": "Attach a book (librarian or admin)", "tags": ["Library"], "responses": { "201": { "description": "Attached" }, "409": { "description": "Already attached" } } }
                },
                "/{id}/books/{book_id}": {
                    "delete": { "summary": "Detach a book (librarian or admin)", "tags": ["Library"], "responses": { "204": { "description": "Detached" }, "404": { "description": "Not attached" } } }
                },
                "/{id}/librarian": {
                    "get": { "summary": "Librarian assigned to a library", "tags": ["Library"], "responses": { "200": { "description": "Librarian" }, "404": { "description": "None assigned" } } },
                    "put": { "summary": "Assign the librarian (admin only)", "tags": ["Library"], "responses": { "200": { "description": "Assigned" } } }
                },
                "/dashboard/admin": {
                    "get": { "summary": "Admin summary (admin role required)", "tags": ["Library"], "responses": { "200": { "description": "Counts" }, "403": { "description": "Wrong role" } } }
                },
                "/dashboard/librarian": {
                    "get": { "summary": "Librarian summary (librarian role required)", "tags": ["Library"], "responses": { "200": { "description": "Counts" }, "403": { "description": "Wrong role" } } }
                },
                "/dashboard/member": {
                    "get": { "summary": "Member summary (member role required)", "tags": ["Library"], "responses": { "200": { "description": "Counts" }, "403": { "description": "Wrong role" } } }
                }
            },
            "components": {
                "schemas": {
                    "Library": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "name": { "type": "string" }
                        },
                        "required": ["id", "name"]
                    },
                    "LibraryDetail": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer" },
                            "name": { "type": "string" },
                            "books": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/Book" }
                            },
                            "librarian": {
                                "type": "object",
                                "nullable": true,
                                "properties": {
                                    "id": { "type": "integer" },
                                    "name": { "type": "string" },
                                    "library_id": { "type": "integer" }
                                }
                            }
                        },
                        "required": ["id", "name", "books"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_init",
            up: r#"
                CREATE TABLE library (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );
                CREATE TABLE library_book (
                    library_id INTEGER NOT NULL REFERENCES library(id) ON DELETE CASCADE,
                    book_id INTEGER NOT NULL REFERENCES book(id) ON DELETE CASCADE,
                    PRIMARY KEY (library_id, book_id)
                );
                CREATE TABLE librarian (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    library_id INTEGER NOT NULL UNIQUE REFERENCES library(id) ON DELETE CASCADE
                );
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "library module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "library module stopped");
        Ok(())
    }
}

/// Create a new instance of the library module
pub fn create_module() -> std::sync::Arc<dyn Module> {
    std::sync::Arc::new(LibraryModule::new())
}

use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use folio_auth::{CurrentUser, Role};
use folio_db::Db;
use folio_http::error::AppError;

use super::models::{AttachBookInput, Librarian, LibrarianInput, Library, LibraryDetail, LibraryInput};
use crate::modules::books::models::Book;

const SELECT_HOLDINGS: &str =
    "SELECT b.id, b.title, b.publication_year, b.author_id, a.name AS author_name \
     FROM book b \
     JOIN author a ON a.id = b.author_id \
     JOIN library_book lb ON lb.book_id = b.id \
     WHERE lb.library_id = ?1 \
     ORDER BY b.title";

#[derive(Clone)]
pub(crate) struct LibraryState {
    pub db: Db,
}

impl FromRef<LibraryState> for Db {
    fn from_ref(state: &LibraryState) -> Db {
        state.db.clone()
    }
}

pub(crate) fn router(db: Db) -> Router {
    Router::new()
        .route("/", get(list_libraries).post(create_library))
        .route("/{id}", get(get_library).delete(delete_library))
        .route("/{id}/books", get(library_books).post(attach_book))
        .route("/{id}/books/{book_id}", axum::routing::delete(detach_book))
        .route("/{id}/librarian", get(get_librarian).put(assign_librarian))
        .route("/dashboard/admin", get(admin_dashboard))
        .route("/dashboard/librarian", get(librarian_dashboard))
        .route("/dashboard/member", get(member_dashboard))
        .with_state(LibraryState { db })
}

async fn ensure_library_exists(db: &Db, id: i64) -> Result<Library, AppError> {
    sqlx::query_as::<_, Library>("SELECT id, name FROM library WHERE id = ?1")
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::not_found(format!("no library with id {id}")))
}

async fn fetch_holdings(db: &Db, library_id: i64) -> Result<Vec<Book>, AppError> {
    let books = sqlx::query_as::<_, Book>(SELECT_HOLDINGS)
        .bind(library_id)
        .fetch_all(db.pool())
        .await?;
    Ok(books)
}

async fn fetch_librarian(db: &Db, library_id: i64) -> Result<Option<Librarian>, AppError> {
    let librarian = sqlx::query_as::<_, Librarian>(
        "SELECT id, name, library_id FROM librarian WHERE library_id = ?1",
    )
    .bind(library_id)
    .fetch_optional(db.pool())
    .await?;
    Ok(librarian)
}

async fn list_libraries(State(state): State<LibraryState>) -> Result<Json<Vec<Library>>, AppError> {
    let libraries = sqlx::query_as::<_, Library>("SELECT id, name FROM library ORDER BY name")
        .fetch_all(state.db.pool())
        .await?;
    Ok(Json(libraries))
}

async fn create_library(
    State(state): State<LibraryState>,
    user: CurrentUser,
    Json(input): Json<LibraryInput>,
) -> Result<(StatusCode, Json<Library>), AppError> {
    user.require_role(Role::Admin)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::field_validation("name", "may not be blank"));
    }

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM library WHERE name = ?1")
        .bind(name)
        .fetch_optional(state.db.pool())
        .await?;
    if existing.is_some() {
        return Err(AppError::conflict(
            vec![json!({"field": "name", "error": "already exists"})],
            "a library with that name already exists",
        ));
    }

    let result = sqlx::query("INSERT INTO library (name) VALUES (?1)")
        .bind(name)
        .execute(state.db.pool())
        .await?;

    tracing::info!(admin = %user.username, library = result.last_insert_rowid(), "library created");
    Ok((
        StatusCode::CREATED,
        Json(Library {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        }),
    ))
}

async fn get_library(
    State(state): State<LibraryState>,
    Path(id): Path<i64>,
) -> Result<Json<LibraryDetail>, AppError> {
    let library = ensure_library_exists(&state.db, id).await?;
    let books = fetch_holdings(&state.db, id).await?;
    let librarian = fetch_librarian(&state.db, id).await?;

    Ok(Json(LibraryDetail {
        id: library.id,
        name: library.name,
        books,
        librarian,
    }))
}

async fn delete_library(
    State(state): State<LibraryState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_role(Role::Admin)?;

    let result = sqlx::query("DELETE FROM library WHERE id = ?1")
        .bind(id)
        .execute(state.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("no library with id {id}")));
    }

    tracing::info!(admin = %user.username, library = id, "library deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn library_books(
    State(state): State<LibraryState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Book>>, AppError> {
    ensure_library_exists(&state.db, id).await?;
    let books = fetch_holdings(&state.db, id).await?;
    Ok(Json(books))
}

async fn attach_book(
    State(state): State<LibraryState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<AttachBookInput>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    user.require_any(&[Role::Librarian, Role::Admin])?;
    ensure_library_exists(&state.db, id).await?;

    let book = sqlx::query_as::<_, Book>(
        "SELECT b.id, b.title, b.publication_year, b.author_id, a.name AS author_name
         FROM book b JOIN author a ON a.id = b.author_id
         WHERE b.id = ?1",
    )
    .bind(input.book_id)
    .fetch_optional(state.db.pool())
    .await?
    .ok_or_else(|| AppError::field_validation("book_id", "unknown book"))?;

    let attached: Option<(i64,)> = sqlx::query_as(
        "SELECT book_id FROM library_book WHERE library_id = ?1 AND book_id = ?2",
    )
    .bind(id)
    .bind(input.book_id)
    .fetch_optional(state.db.pool())
    .await?;
    if attached.is_some() {
        return Err(AppError::conflict(
            vec![json!({"field": "book_id", "error": "already attached"})],
            "that book is already in this library",
        ));
    }

    sqlx::query("INSERT INTO library_book (library_id, book_id) VALUES (?1, ?2)")
        .bind(id)
        .bind(input.book_id)
        .execute(state.db.pool())
        .await?;

    tracing::info!(user = %user.username, library = id, book = input.book_id, "book attached");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn detach_book(
    State(state): State<LibraryState>,
    user: CurrentUser,
    Path((id, book_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    user.require_any(&[Role::Librarian, Role::Admin])?;

    let result = sqlx::query("DELETE FROM library_book WHERE library_id = ?1 AND book_id = ?2")
        .bind(id)
        .bind(book_id)
        .execute(state.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("that book is not in this library"));
    }

    tracing::info!(user = %user.username, library = id, book = book_id, "book detached");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_librarian(
    State(state): State<LibraryState>,
    Path(id): Path<i64>,
) -> Result<Json<Librarian>, AppError> {
    ensure_library_exists(&state.db, id).await?;
    fetch_librarian(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("no librarian assigned to this library"))
}

async fn assign_librarian(
    State(state): State<LibraryState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<LibrarianInput>,
) -> Result<Json<Librarian>, AppError> {
    user.require_role(Role::Admin)?;
    ensure_library_exists(&state.db, id).await?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::field_validation("name", "may not be blank"));
    }

    // One librarian per library; reassignment replaces the name.
    sqlx::query(
        "INSERT INTO librarian (name, library_id) VALUES (?1, ?2)
         ON CONFLICT(library_id) DO UPDATE SET name = excluded.name",
    )
    .bind(name)
    .bind(id)
    .execute(state.db.pool())
    .await?;

    let librarian = fetch_librarian(&state.db, id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("librarian row missing after upsert")))?;

    tracing::info!(admin = %user.username, library = id, librarian = %librarian.name, "librarian assigned");
    Ok(Json(librarian))
}

async fn count(db: &Db, sql: &str) -> Result<i64, AppError> {
    let value: i64 = sqlx::query_scalar(sql).fetch_one(db.pool()).await?;
    Ok(value)
}

async fn admin_dashboard(
    State(state): State<LibraryState>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_role(Role::Admin)?;

    Ok(Json(json!({
        "role": "admin",
        "users": count(&state.db, "SELECT COUNT(*) FROM auth_user").await?,
        "libraries": count(&state.db, "SELECT COUNT(*) FROM library").await?,
        "books": count(&state.db, "SELECT COUNT(*) FROM book").await?,
    })))
}

async fn librarian_dashboard(
    State(state): State<LibraryState>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_role(Role::Librarian)?;

    Ok(Json(json!({
        "role": "librarian",
        "libraries": count(&state.db, "SELECT COUNT(*) FROM library").await?,
        "staffed_libraries": count(&state.db, "SELECT COUNT(*) FROM librarian").await?,
        "holdings": count(&state.db, "SELECT COUNT(*) FROM library_book").await?,
    })))
}

async fn member_dashboard(
    State(state): State<LibraryState>,
    user: CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    user.require_role(Role::Member)?;

    Ok(Json(json!({
        "role": "member",
        "libraries": count(&state.db, "SELECT COUNT(*) FROM library").await?,
        "books": count(&state.db, "SELECT COUNT(*) FROM book").await?,
    })))
}

use std::collections::HashMap;

use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use sqlx::{QueryBuilder, Sqlite};

use folio_auth::CurrentUser;
use folio_db::Db;
use folio_http::error::AppError;

use super::models::{Author, AuthorDetail, AuthorInput, Book, BookInput, BookListQuery};
use crate::utils;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

const SELECT_BOOK: &str = "SELECT b.id, b.title, b.publication_year, b.author_id, a.name AS author_name \
     FROM book b JOIN author a ON a.id = b.author_id";

#[derive(Clone)]
pub(crate) struct BooksState {
    pub db: Db,
}

impl FromRef<BooksState> for Db {
    fn from_ref(state: &BooksState) -> Db {
        state.db.clone()
    }
}

pub(crate) fn router(db: Db) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/authors", get(list_authors).post(create_author))
        .route("/authors/{id}", get(get_author).delete(delete_author))
        .with_state(BooksState { db })
}

fn validate_book(input: &BookInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::field_validation("title", "may not be blank"));
    }
    if input.publication_year < 0 {
        return Err(AppError::field_validation(
            "publication_year",
            "must not be negative",
        ));
    }
    if input.publication_year > utils::current_year() {
        return Err(AppError::field_validation(
            "publication_year",
            "Publication year cannot be in the future.",
        ));
    }
    Ok(())
}

async fn ensure_author_exists(db: &Db, author_id: i64) -> Result<(), AppError> {
    let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM author WHERE id = ?1")
        .bind(author_id)
        .fetch_optional(db.pool())
        .await?;
    if found.is_none() {
        return Err(AppError::field_validation("author", "unknown author"));
    }
    Ok(())
}

async fn fetch_book(db: &Db, id: i64) -> Result<Option<Book>, AppError> {
    let book = sqlx::query_as::<_, Book>(&format!("{SELECT_BOOK} WHERE b.id = ?1"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    Ok(book)
}

async fn list_books(
    State(state): State<BooksState>,
    Query(query): Query<BookListQuery>,
) -> Result<Json<Vec<Book>>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_BOOK);
    qb.push(" WHERE 1=1");

    if let Some(title) = &query.title {
        qb.push(" AND b.title = ").push_bind(title);
    }
    if let Some(year) = query.publication_year {
        qb.push(" AND b.publication_year = ").push_bind(year);
    }
    if let Some(author) = query.author {
        qb.push(" AND b.author_id = ").push_bind(author);
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (lower(b.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(a.name) LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    // Ordering is restricted to a fixed set of columns; anything else is a
    // validation error rather than a silently-ignored parameter.
    let order = match query.ordering.as_deref() {
        None | Some("title") => "b.title ASC",
        Some("-title") => "b.title DESC",
        Some("publication_year") => "b.publication_year ASC",
        Some("-publication_year") => "b.publication_year DESC",
        Some(other) => {
            return Err(AppError::field_validation(
                "ordering",
                format!("unsupported ordering '{other}'"),
            ))
        }
    };
    qb.push(" ORDER BY ").push(order);

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    qb.push(" LIMIT ").push_bind(i64::from(limit));
    qb.push(" OFFSET ")
        .push_bind(i64::from(query.offset.unwrap_or(0)));

    let books = qb
        .build_query_as::<Book>()
        .fetch_all(state.db.pool())
        .await?;
    Ok(Json(books))
}

async fn get_book(
    State(state): State<BooksState>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, AppError> {
    let book = fetch_book(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no book with id {id}")))?;
    Ok(Json(book))
}

async fn create_book(
    State(state): State<BooksState>,
    user: CurrentUser,
    Json(input): Json<BookInput>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    validate_book(&input)?;
    ensure_author_exists(&state.db, input.author).await?;

    let result =
        sqlx::query("INSERT INTO book (title, publication_year, author_id) VALUES (?1, ?2, ?3)")
            .bind(input.title.trim())
            .bind(input.publication_year)
            .bind(input.author)
            .execute(state.db.pool())
            .await?;

    let book = fetch_book(&state.db, result.last_insert_rowid())
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("created book row missing")))?;

    tracing::info!(user = %user.username, book = book.id, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(state): State<BooksState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<BookInput>,
) -> Result<Json<Book>, AppError> {
    validate_book(&input)?;
    ensure_author_exists(&state.db, input.author).await?;

    let result = sqlx::query(
        "UPDATE book SET title = ?1, publication_year = ?2, author_id = ?3 WHERE id = ?4",
    )
    .bind(input.title.trim())
    .bind(input.publication_year)
    .bind(input.author)
    .bind(id)
    .execute(state.db.pool())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("no book with id {id}")));
    }

    let book = fetch_book(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no book with id {id}")))?;

    tracing::info!(user = %user.username, book = id, "book updated");
    Ok(Json(book))
}

async fn delete_book(
    State(state): State<BooksState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM book WHERE id = ?1")
        .bind(id)
        .execute(state.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("no book with id {id}")));
    }

    tracing::info!(user = %user.username, book = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Group all books by author id, for nesting into author payloads.
async fn books_by_author(db: &Db) -> Result<HashMap<i64, Vec<Book>>, AppError> {
    let books = sqlx::query_as::<_, Book>(&format!("{SELECT_BOOK} ORDER BY b.title"))
        .fetch_all(db.pool())
        .await?;

    let mut grouped: HashMap<i64, Vec<Book>> = HashMap::new();
    for book in books {
        grouped.entry(book.author_id).or_default().push(book);
    }
    Ok(grouped)
}

async fn list_authors(
    State(state): State<BooksState>,
) -> Result<Json<Vec<AuthorDetail>>, AppError> {
    let authors = sqlx::query_as::<_, Author>("SELECT id, name FROM author ORDER BY name")
        .fetch_all(state.db.pool())
        .await?;
    let mut grouped = books_by_author(&state.db).await?;

    let details = authors
        .into_iter()
        .map(|author| AuthorDetail {
            books: grouped.remove(&author.id).unwrap_or_default(),
            id: author.id,
            name: author.name,
        })
        .collect();

    Ok(Json(details))
}

async fn get_author(
    State(state): State<BooksState>,
    Path(id): Path<i64>,
) -> Result<Json<AuthorDetail>, AppError> {
    let author = sqlx::query_as::<_, Author>("SELECT id, name FROM author WHERE id = ?1")
        .bind(id)
        .fetch_optional(state.db.pool())
        .await?
        .ok_or_else(|| AppError::not_found(format!("no author with id {id}")))?;

    let mut grouped = books_by_author(&state.db).await?;

    Ok(Json(AuthorDetail {
        books: grouped.remove(&author.id).unwrap_or_default(),
        id: author.id,
        name: author.name,
    }))
}

async fn create_author(
    State(state): State<BooksState>,
    user: CurrentUser,
    Json(input): Json<AuthorInput>,
) -> Result<(StatusCode, Json<Author>), AppError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::field_validation("name", "may not be blank"));
    }

    let result = sqlx::query("INSERT INTO author (name) VALUES (?1)")
        .bind(name)
        .execute(state.db.pool())
        .await?;

    tracing::info!(user = %user.username, author = result.last_insert_rowid(), "author created");
    Ok((
        StatusCode::CREATED,
        Json(Author {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        }),
    ))
}

async fn delete_author(
    State(state): State<BooksState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    // Books cascade with the author row.
    let result = sqlx::query("DELETE FROM author WHERE id = ?1")
        .bind(id)
        .execute(state.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("no author with id {id}")));
    }

    tracing::info!(user = %user.username, author = id, "author deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use axum::Router;
    use serde_json::json;

    use crate::modules::testing::{json_body, register_user, send, test_app};

    /// Two authors with one book each, created through the API.
    async fn seed(app: &Router, token: &str) {
        for (author, title, year) in [
            ("William", "A Study of Maps", 2020),
            ("John", "Advanced Cartography", 2022),
        ] {
            let response = send(
                app,
                Method::POST,
                "/api/books/authors",
                Some(token),
                Some(json!({ "name": author })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
            let author_id = json_body(response).await["id"].as_i64().unwrap();

            let response = send(
                app,
                Method::POST,
                "/api/books/",
                Some(token),
                Some(json!({ "title": title, "publication_year": year, "author": author_id })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn list_and_detail_are_public() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response = send(&app, Method::GET, "/api/books/", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let response = send(&app, Method::GET, "/api/books/1", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["title"], "A Study of Maps");
        assert_eq!(body["author_name"], "William");

        let response = send(&app, Method::GET, "/api/books/999", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn writes_require_authentication() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let payload = json!({ "title": "Unauthorized", "publication_year": 2021, "author": 1 });
        let response = send(&app, Method::POST, "/api/books/", None, Some(payload.clone())).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::PUT, "/api/books/1", None, Some(payload)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::DELETE, "/api/books/1", None, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_update_delete_roundtrip() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response = send(
            &app,
            Method::POST,
            "/api/books/",
            Some(&token),
            Some(json!({ "title": "New Book", "publication_year": 2023, "author": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["id"].as_i64().unwrap();

        let response = send(
            &app,
            Method::PUT,
            &format!("/api/books/{id}"),
            Some(&token),
            Some(json!({ "title": "Updated Title", "publication_year": 2021, "author": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["title"], "Updated Title");
        assert_eq!(updated["publication_year"], 2021);

        let response =
            send(&app, Method::DELETE, &format!("/api/books/{id}"), Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, Method::GET, &format!("/api/books/{id}"), None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_future_publication_year() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let future = crate::utils::current_year() + 1;
        let response = send(
            &app,
            Method::POST,
            "/api/books/",
            Some(&token),
            Some(json!({ "title": "From the Future", "publication_year": future, "author": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["details"][0]["field"], "publication_year");
    }

    #[tokio::test]
    async fn rejects_invalid_book_input() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        // Negative year
        let response = send(
            &app,
            Method::POST,
            "/api/books/",
            Some(&token),
            Some(json!({ "title": "Ancient", "publication_year": -44, "author": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Blank title
        let response = send(
            &app,
            Method::POST,
            "/api/books/",
            Some(&token),
            Some(json!({ "title": "  ", "publication_year": 2020, "author": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown author id
        let response = send(
            &app,
            Method::POST,
            "/api/books/",
            Some(&token),
            Some(json!({ "title": "Orphan", "publication_year": 2020, "author": 999 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["details"][0]["field"], "author");
    }

    #[tokio::test]
    async fn filters_by_exact_fields() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response =
            send(&app, Method::GET, "/api/books/?publication_year=2022", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["title"], "Advanced Cartography");

        let response = send(&app, Method::GET, "/api/books/?author=1", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["author_name"], "William");
    }

    #[tokio::test]
    async fn search_covers_title_and_author_name() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response = send(&app, Method::GET, "/api/books/?search=advanced", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["title"], "Advanced Cartography");

        let response = send(&app, Method::GET, "/api/books/?search=william", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["author_name"], "William");
    }

    #[tokio::test]
    async fn ordering_is_whitelisted() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response = send(
            &app,
            Method::GET,
            "/api/books/?ordering=-publication_year",
            None,
            None,
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body[0]["publication_year"], 2022);
        assert_eq!(body[1]["publication_year"], 2020);

        // Default ordering is by title.
        let response = send(&app, Method::GET, "/api/books/", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body[0]["title"], "A Study of Maps");

        let response =
            send(&app, Method::GET, "/api/books/?ordering=id;DROP", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authors_nest_their_books() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response = send(&app, Method::GET, "/api/books/authors", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let authors = body.as_array().unwrap();
        assert_eq!(authors.len(), 2);
        // Ordered by name: John before William.
        assert_eq!(authors[0]["name"], "John");
        assert_eq!(authors[0]["books"][0]["title"], "Advanced Cartography");

        let response = send(&app, Method::GET, "/api/books/authors/1", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body["name"], "William");
        assert_eq!(body["books"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_author_cascades_to_books() {
        let (app, _db) = test_app().await;
        let token = register_user(&app, "amelia").await;
        seed(&app, &token).await;

        let response =
            send(&app, Method::DELETE, "/api/books/authors/1", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, Method::GET, "/api/books/", None, None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["author_name"], "John");
    }
}

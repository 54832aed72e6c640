use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A book row joined with its author's name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub publication_year: i64,
    pub author_id: i64,
    pub author_name: String,
}

/// Create/update payload for a book. `author` is the author's id.
#[derive(Debug, Clone, Deserialize)]
pub struct BookInput {
    pub title: String,
    pub publication_year: i64,
    pub author: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

/// An author with its nested books.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorDetail {
    pub id: i64,
    pub name: String,
    pub books: Vec<Book>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorInput {
    pub name: String,
}

/// Query parameters accepted by the book list endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BookListQuery {
    pub title: Option<String>,
    pub publication_year: Option<i64>,
    /// Author id, matching the foreign key.
    pub author: Option<i64>,
    /// Case-insensitive substring match over title and author name.
    pub search: Option<String>,
    /// One of `title`, `-title`, `publication_year`, `-publication_year`.
    pub ordering: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

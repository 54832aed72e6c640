use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::modules::books::models::Book;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Library {
    pub id: i64,
    pub name: String,
}

/// A library with its holdings and assigned librarian.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryDetail {
    pub id: i64,
    pub name: String,
    pub books: Vec<Book>,
    pub librarian: Option<Librarian>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Librarian {
    pub id: i64,
    pub name: String,
    pub library_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryInput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachBookInput {
    pub book_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibrarianInput {
    pub name: String,
}

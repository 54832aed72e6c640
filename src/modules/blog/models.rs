use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A post row joined with its author's username.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A post with its tags and comments.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
    pub tags: Vec<String>,
    pub comments: Vec<Comment>,
}

impl PostDetail {
    pub fn from_parts(post: Post, tags: Vec<String>, comments: Vec<Comment>) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            author: post.author,
            created_at: post.created_at,
            updated_at: post.updated_at,
            tags,
            comments,
        }
    }
}

/// Create/update payload for a post. When `tags` is present it replaces
/// the post's tag set.
#[derive(Debug, Clone, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub content: String,
}

/// Query parameters accepted by the post list endpoint.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PostListQuery {
    /// Case-insensitive substring match over title and content.
    pub search: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

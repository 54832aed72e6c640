use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::{QueryBuilder, Sqlite};

use folio_auth::CurrentUser;
use folio_db::Db;
use folio_http::error::AppError;

use super::models::{Comment, CommentInput, Post, PostDetail, PostInput, PostListQuery};
use crate::utils;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

const SELECT_POST: &str =
    "SELECT p.id, p.title, p.content, p.author_id, u.username AS author, p.created_at, p.updated_at \
     FROM post p JOIN auth_user u ON u.id = p.author_id";

const SELECT_COMMENT: &str =
    "SELECT c.id, c.post_id, c.author_id, u.username AS author, c.content, c.created_at \
     FROM comment c JOIN auth_user u ON u.id = c.author_id";

#[derive(Clone)]
pub(crate) struct BlogState {
    pub db: Db,
}

impl FromRef<BlogState> for Db {
    fn from_ref(state: &BlogState) -> Db {
        state.db.clone()
    }
}

pub(crate) fn router(db: Db) -> Router {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/posts/{id}/comments", post(create_comment))
        .route(
            "/comments/{id}",
            axum::routing::put(update_comment).delete(delete_comment),
        )
        .route("/tags/{tag}", get(posts_by_tag))
        .with_state(BlogState { db })
}

fn validate_post(input: &PostInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::field_validation("title", "may not be blank"));
    }
    if input.content.trim().is_empty() {
        return Err(AppError::field_validation("content", "may not be blank"));
    }
    Ok(())
}

/// Tags are stored trimmed and lowercased; empties are dropped.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

async fn fetch_post(db: &Db, id: i64) -> Result<Option<Post>, AppError> {
    let post = sqlx::query_as::<_, Post>(&format!("{SELECT_POST} WHERE p.id = ?1"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?;
    Ok(post)
}

async fn fetch_tags(db: &Db, post_id: i64) -> Result<Vec<String>, AppError> {
    let tags: Vec<(String,)> =
        sqlx::query_as("SELECT tag FROM post_tag WHERE post_id = ?1 ORDER BY tag")
            .bind(post_id)
            .fetch_all(db.pool())
            .await?;
    Ok(tags.into_iter().map(|(tag,)| tag).collect())
}

async fn fetch_comments(db: &Db, post_id: i64) -> Result<Vec<Comment>, AppError> {
    let comments = sqlx::query_as::<_, Comment>(&format!(
        "{SELECT_COMMENT} WHERE c.post_id = ?1 ORDER BY c.created_at, c.id"
    ))
    .bind(post_id)
    .fetch_all(db.pool())
    .await?;
    Ok(comments)
}

async fn replace_tags(db: &Db, post_id: i64, tags: &[String]) -> Result<(), AppError> {
    sqlx::query("DELETE FROM post_tag WHERE post_id = ?1")
        .bind(post_id)
        .execute(db.pool())
        .await?;
    for tag in normalize_tags(tags) {
        sqlx::query("INSERT OR IGNORE INTO post_tag (post_id, tag) VALUES (?1, ?2)")
            .bind(post_id)
            .bind(tag)
            .execute(db.pool())
            .await?;
    }
    Ok(())
}

async fn post_detail(db: &Db, post: Post) -> Result<PostDetail, AppError> {
    let tags = fetch_tags(db, post.id).await?;
    let comments = fetch_comments(db, post.id).await?;
    Ok(PostDetail::from_parts(post, tags, comments))
}

async fn list_posts(
    State(state): State<BlogState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_POST);
    qb.push(" WHERE 1=1");

    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search.to_lowercase());
        qb.push(" AND (lower(p.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(p.content) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(tag) = &query.tag {
        qb.push(" AND EXISTS (SELECT 1 FROM post_tag pt WHERE pt.post_id = p.id AND pt.tag = ")
            .push_bind(tag.trim().to_lowercase())
            .push(")");
    }

    // Newest first, with the id as a tie-breaker for equal timestamps.
    qb.push(" ORDER BY p.created_at DESC, p.id DESC");

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    qb.push(" LIMIT ").push_bind(i64::from(limit));
    qb.push(" OFFSET ")
        .push_bind(i64::from(query.offset.unwrap_or(0)));

    let posts = qb
        .build_query_as::<Post>()
        .fetch_all(state.db.pool())
        .await?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<BlogState>,
    user: CurrentUser,
    Json(input): Json<PostInput>,
) -> Result<(StatusCode, Json<PostDetail>), AppError> {
    validate_post(&input)?;

    let now = utils::now_rfc3339();
    let result = sqlx::query(
        "INSERT INTO post (title, content, author_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
    )
    .bind(input.title.trim())
    .bind(input.content.trim())
    .bind(user.id)
    .bind(&now)
    .execute(state.db.pool())
    .await?;

    let post_id = result.last_insert_rowid();
    if let Some(tags) = &input.tags {
        replace_tags(&state.db, post_id, tags).await?;
    }

    let post = fetch_post(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("created post row missing")))?;

    tracing::info!(author = %user.username, post = post_id, "post created");
    Ok((
        StatusCode::CREATED,
        Json(post_detail(&state.db, post).await?),
    ))
}

async fn get_post(
    State(state): State<BlogState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, AppError> {
    let post = fetch_post(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no post with id {id}")))?;
    Ok(Json(post_detail(&state.db, post).await?))
}

async fn update_post(
    State(state): State<BlogState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<Json<PostDetail>, AppError> {
    validate_post(&input)?;

    let post = fetch_post(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no post with id {id}")))?;
    if post.author_id != user.id {
        return Err(AppError::forbidden("only the author may edit this post"));
    }

    sqlx::query("UPDATE post SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4")
        .bind(input.title.trim())
        .bind(input.content.trim())
        .bind(utils::now_rfc3339())
        .bind(id)
        .execute(state.db.pool())
        .await?;

    if let Some(tags) = &input.tags {
        replace_tags(&state.db, id, tags).await?;
    }

    let post = fetch_post(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no post with id {id}")))?;

    tracing::info!(author = %user.username, post = id, "post updated");
    Ok(Json(post_detail(&state.db, post).await?))
}

async fn delete_post(
    State(state): State<BlogState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let post = fetch_post(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no post with id {id}")))?;
    if post.author_id != user.id {
        return Err(AppError::forbidden("only the author may delete this post"));
    }

    sqlx::query("DELETE FROM post WHERE id = ?1")
        .bind(id)
        .execute(state.db.pool())
        .await?;

    tracing::info!(author = %user.username, post = id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn create_comment(
    State(state): State<BlogState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<CommentInput>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    if input.content.trim().is_empty() {
        return Err(AppError::field_validation("content", "may not be blank"));
    }

    let post = fetch_post(&state.db, id).await?;
    if post.is_none() {
        return Err(AppError::not_found(format!("no post with id {id}")));
    }

    let result = sqlx::query(
        "INSERT INTO comment (post_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(id)
    .bind(user.id)
    .bind(input.content.trim())
    .bind(utils::now_rfc3339())
    .execute(state.db.pool())
    .await?;

    let comment = sqlx::query_as::<_, Comment>(&format!("{SELECT_COMMENT} WHERE c.id = ?1"))
        .bind(result.last_insert_rowid())
        .fetch_one(state.db.pool())
        .await?;

    tracing::info!(author = %user.username, post = id, comment = comment.id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn fetch_own_comment(db: &Db, id: i64, user: &CurrentUser) -> Result<Comment, AppError> {
    let comment = sqlx::query_as::<_, Comment>(&format!("{SELECT_COMMENT} WHERE c.id = ?1"))
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::not_found(format!("no comment with id {id}")))?;

    if comment.author_id != user.id {
        return Err(AppError::forbidden("only the author may modify this comment"));
    }
    Ok(comment)
}

async fn update_comment(
    State(state): State<BlogState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<CommentInput>,
) -> Result<Json<Comment>, AppError> {
    if input.content.trim().is_empty() {
        return Err(AppError::field_validation("content", "may not be blank"));
    }

    let mut comment = fetch_own_comment(&state.db, id, &user).await?;

    sqlx::query("UPDATE comment SET content = ?1 WHERE id = ?2")
        .bind(input.content.trim())
        .bind(id)
        .execute(state.db.pool())
        .await?;

    comment.content = input.content.trim().to_string();
    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<BlogState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    fetch_own_comment(&state.db, id, &user).await?;

    sqlx::query("DELETE FROM comment WHERE id = ?1")
        .bind(id)
        .execute(state.db.pool())
        .await?;

    tracing::info!(author = %user.username, comment = id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn posts_by_tag(
    State(state): State<BlogState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        "{SELECT_POST} WHERE EXISTS (SELECT 1 FROM post_tag pt WHERE pt.post_id = p.id AND pt.tag = ?1) \
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(tag.trim().to_lowercase())
    .fetch_all(state.db.pool())
    .await?;
    Ok(Json(posts))
}

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::post::{Comment, Post},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlPool, types::Json};
use std::collections::HashMap;
use tracing::info;
use utoipa::ToSchema;

const DEFAULT_POST_TYPE: &str = "Activity";

#[derive(Deserialize, ToSchema)]
pub struct CreatePost {
    #[schema(example = "Welcome our new designers!")]
    pub content: String,
    #[serde(rename = "type")]
    #[schema(example = "Announcement")]
    pub post_type: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateComment {
    #[schema(example = "Congratulations!")]
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct CommentView {
    pub id: u64,
    #[schema(example = "Asha Rao")]
    pub author_name: String,
    pub content: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Serialize, ToSchema)]
pub struct PostView {
    pub id: u64,
    #[schema(example = "Admin")]
    pub author_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub post_type: String,
    pub images: Vec<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub likes_count: usize,
    /// Employee codes of everyone who liked the post
    pub likes: Vec<String>,
    pub comments: Vec<CommentView>,
}

/// Name shown for rows whose author was deleted or is the built-in admin.
fn author_label(name: Option<String>) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Admin".to_string())
}

#[derive(sqlx::FromRow)]
struct PostRow {
    #[sqlx(flatten)]
    post: Post,
    author_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    #[sqlx(flatten)]
    comment: Comment,
    author_name: Option<String>,
}

fn assemble(
    posts: Vec<PostRow>,
    likes: Vec<(u64, String)>,
    comments: Vec<CommentRow>,
) -> Vec<PostView> {
    let mut likes_by_post: HashMap<u64, Vec<String>> = HashMap::new();
    for (post_id, code) in likes {
        likes_by_post.entry(post_id).or_default().push(code);
    }

    let mut comments_by_post: HashMap<u64, Vec<CommentView>> = HashMap::new();
    for row in comments {
        comments_by_post
            .entry(row.comment.post_id)
            .or_default()
            .push(CommentView {
                id: row.comment.id,
                author_name: author_label(row.author_name),
                content: row.comment.content,
                created_at: row.comment.created_at,
            });
    }

    posts
        .into_iter()
        .map(|row| {
            let likes = likes_by_post.remove(&row.post.id).unwrap_or_default();
            PostView {
                author_name: author_label(row.author_name),
                likes_count: likes.len(),
                likes,
                comments: comments_by_post.remove(&row.post.id).unwrap_or_default(),
                id: row.post.id,
                content: row.post.content,
                post_type: row.post.post_type,
                images: row.post.images.0,
                created_at: row.post.created_at,
            }
        })
        .collect()
}

async fn post_exists(pool: &MySqlPool, id: u64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?)")
        .bind(id)
        .fetch_one(pool)
        .await
}

/// Feed, newest first
#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "Posts with likes and comments", body = [PostView])),
    security(("bearer_auth" = [])),
    tag = "Feed"
)]
pub async fn list_posts(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let posts = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.id, p.author_id, p.content, p.post_type, p.images, p.created_at,
               TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, ''))) AS author_name
        FROM posts p
        LEFT JOIN employees e ON e.id = p.author_id
        ORDER BY p.created_at DESC, p.id DESC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let likes: Vec<(u64, String)> = sqlx::query_as(
        r#"
        SELECT pl.post_id, e.employee_id
        FROM post_likes pl
        JOIN employees e ON e.id = pl.employee_id
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    let comments = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.post_id, c.author_id, c.content, c.created_at,
               TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, ''))) AS author_name
        FROM post_comments c
        LEFT JOIN employees e ON e.id = c.author_id
        ORDER BY c.created_at, c.id
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(assemble(posts, likes, comments)))
}

/// Publish a post
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePost,
    responses(
        (status = 201, description = "Post created", body = Object, example = json!({"message": "Post created successfully", "id": 8})),
        (status = 400, description = "Content is required"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Feed"
)]
pub async fn create_post(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePost>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let payload = payload.into_inner();
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }
    let post_type = payload
        .post_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_POST_TYPE);

    let id = sqlx::query("INSERT INTO posts (author_id, content, post_type, images) VALUES (?, ?, ?, ?)")
        .bind(auth.employee_id)
        .bind(content)
        .bind(post_type)
        .bind(Json(&payload.images))
        .execute(pool.get_ref())
        .await?
        .last_insert_id();

    info!(id, author = %auth.user_key, "Post created");
    Ok(HttpResponse::Created().json(json!({"message": "Post created successfully", "id": id})))
}

/// Delete a post
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = u64, Path, description = "Post id")),
    responses((status = 200, description = "Post deleted"), (status = 403, description = "Admin only"), (status = 404, description = "Post not found")),
    security(("bearer_auth" = [])),
    tag = "Feed"
)]
pub async fn delete_post(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(ApiError::not_found("Post not found"));
    }
    Ok(HttpResponse::Ok().json(json!({"message": "Post deleted successfully"})))
}

/// Like or unlike a post
#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = u64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like toggled", body = Object, example = json!({"message": "Liked", "likes_count": 3})),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Feed"
)]
pub async fn toggle_like(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee_id()?;
    let post_id = path.into_inner();

    if !post_exists(pool.get_ref(), post_id).await? {
        return Err(ApiError::not_found("Post not found"));
    }

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND employee_id = ?")
        .bind(post_id)
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    if removed == 0 {
        sqlx::query("INSERT IGNORE INTO post_likes (post_id, employee_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(employee_id)
            .execute(pool.get_ref())
            .await?;
    }

    let likes_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(pool.get_ref())
        .await?;

    let message = if removed == 0 { "Liked" } else { "Unliked" };
    Ok(HttpResponse::Ok().json(json!({"message": message, "likes_count": likes_count})))
}

/// Comment on a post
#[utoipa::path(
    post,
    path = "/api/posts/{id}/comment",
    params(("id" = u64, Path, description = "Post id")),
    request_body = CreateComment,
    responses(
        (status = 201, description = "Comment added", body = Object, example = json!({"message": "Comment added", "id": 21})),
        (status = 400, description = "Content is required"),
        (status = 404, description = "Post not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Feed"
)]
pub async fn add_comment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateComment>,
) -> ApiResult<HttpResponse> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }

    let post_id = path.into_inner();
    if !post_exists(pool.get_ref(), post_id).await? {
        return Err(ApiError::not_found("Post not found"));
    }

    let id = sqlx::query("INSERT INTO post_comments (post_id, author_id, content) VALUES (?, ?, ?)")
        .bind(post_id)
        .bind(auth.employee_id)
        .bind(content)
        .execute(pool.get_ref())
        .await?
        .last_insert_id();

    Ok(HttpResponse::Created().json(json!({"message": "Comment added", "id": id})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{bearer, lazy_pool};
    use crate::config::Config;
    use crate::model::role::Role;
    use actix_web::{App, test};
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[::core::prelude::v1::test]
    fn feed_groups_likes_and_comments_per_post() {
        let posts = vec![
            PostRow {
                post: Post {
                    id: 2,
                    author_id: None,
                    content: "Holi party at 4".into(),
                    post_type: "Event".into(),
                    images: Json(vec![]),
                    created_at: ts(12),
                },
                author_name: None,
            },
            PostRow {
                post: Post {
                    id: 1,
                    author_id: Some(3),
                    content: "Welcome Kiran".into(),
                    post_type: "Activity".into(),
                    images: Json(vec!["https://cdn/kiran.png".into()]),
                    created_at: ts(9),
                },
                author_name: Some("Ravi Kumar".into()),
            },
        ];
        let likes = vec![(1, "MW-001".to_string()), (1, "MW-004".to_string())];
        let comments = vec![CommentRow {
            comment: Comment {
                id: 5,
                post_id: 2,
                author_id: Some(1),
                content: "See you there".into(),
                created_at: ts(13),
            },
            author_name: Some("Asha Rao".into()),
        }];

        let feed = assemble(posts, likes, comments);
        assert_eq!(feed[0].author_name, "Admin");
        assert_eq!(feed[0].likes_count, 0);
        assert_eq!(feed[0].comments.len(), 1);
        assert_eq!(feed[1].likes, vec!["MW-001", "MW-004"]);
        assert_eq!(feed[1].images.len(), 1);
    }

    #[actix_web::test]
    async fn only_admins_post_and_content_is_required() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/api/posts", web::post().to(create_post))
                .route("/api/posts/{id}/comment", web::post().to(add_comment)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"content": "hello"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(Role::Admin, None))
            .set_json(json!({"content": "   "}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/api/posts/1/comment")
            .insert_header(bearer(Role::Employee, Some(4)))
            .set_json(json!({"content": ""}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}

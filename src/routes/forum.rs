use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{active_user, check_rate, AppState, MessageResponse};
use crate::auth::{Role, SessionUser};
use crate::error::ApiError;
use crate::models::*;
use crate::notifications::{self, Event};
use crate::repo::{RepoError, Repo};
use crate::require_role;
use crate::templates::excerpt;

const MAX_PAGE_SIZE: u32 = 50;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/posts")
            .route(web::get().to(list_posts))
            .route(web::post().to(create_post)),
    )
    .service(
        web::resource("/posts/{id}")
            .route(web::get().to(get_post))
            .route(web::patch().to(update_post))
            .route(web::delete().to(delete_post)),
    )
    .route("/posts/{id}/like", web::post().to(like_post))
    .route("/posts/{id}/comments", web::post().to(create_comment))
    .route("/posts/{id}/moderate", web::post().to(moderate_post))
    .service(
        web::resource("/comments/{id}")
            .route(web::patch().to(update_comment))
            .route(web::delete().to(delete_comment)),
    )
    .route("/comments/{id}/like", web::post().to(like_comment))
    .route("/comments/{id}/moderate", web::post().to(moderate_comment))
    .route("/episodes", web::get().to(list_episodes))
    .route("/episodes/{slug}", web::get().to(get_episode))
    .route("/users/{username}", web::get().to(get_profile))
    .route("/users/{id}/ban", web::post().to(ban_user))
    .route("/users/{id}/role", web::post().to(set_role))
    .route("/moderation/logs", web::get().to(moderation_logs));
}

// ---------------- payloads -----------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPostsParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<SortMode>,
    #[serde(rename = "type")]
    pub post_type: Option<PostType>,
    /// Episode slug or numeric id.
    pub episode: Option<String>,
    /// Author username.
    pub author: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(limit.max(1) as u64);
        Self { page, limit, total, total_pages, has_more: (page as u64) < total_pages }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<AuthorSummary>,
    pub episode: Option<EpisodeSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostListResponse {
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<AuthorSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThreadComment {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<ThreadComment>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 10000, message = "Content must be 1-10000 characters"))]
    pub content: String,
    pub episode_id: Option<Id>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "Content must be 1-10000 characters"))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub content: String,
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerateRequest {
    pub is_moderated: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BanRequest {
    pub banned: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsParams {
    pub limit: Option<usize>,
}

// ---------------- helpers ------------------------------------------

/// Per-request author lookups, so a page of posts hits each user once.
struct Authors<'a> {
    repo: &'a dyn Repo,
    seen: HashMap<Id, Option<AuthorSummary>>,
}

impl<'a> Authors<'a> {
    fn new(repo: &'a dyn Repo) -> Self {
        Self { repo, seen: HashMap::new() }
    }

    async fn get(&mut self, id: Id) -> Result<Option<AuthorSummary>, ApiError> {
        if let Some(hit) = self.seen.get(&id) {
            return Ok(hit.clone());
        }
        let summary = match self.repo.get_user(id).await {
            Ok(u) => Some(AuthorSummary::from(&u)),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        self.seen.insert(id, summary.clone());
        Ok(summary)
    }

    async fn comment(&mut self, comment: Comment) -> Result<CommentView, ApiError> {
        let author = self.get(comment.user_id).await?;
        Ok(CommentView { comment, author })
    }
}

async fn post_view(
    repo: &dyn Repo,
    authors: &mut Authors<'_>,
    post: Post,
) -> Result<PostView, ApiError> {
    let author = authors.get(post.user_id).await?;
    let episode = match post.episode_id {
        Some(ep) => match repo.get_episode(ep).await {
            Ok(e) => Some(EpisodeSummary::from(&e)),
            Err(RepoError::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    Ok(PostView { post, author, episode })
}

fn can_moderate(viewer: &Option<SessionUser>) -> bool {
    viewer.map(|v| v.role.can_moderate()).unwrap_or(false)
}

/// A post the viewer may see. Moderated posts only exist for moderators.
async fn visible_post(data: &AppState, id: Id, moderator: bool) -> Result<Post, ApiError> {
    let post = data.repo.get_post(id).await?;
    if post.is_moderated && !moderator {
        return Err(ApiError::NotFound);
    }
    Ok(post)
}

/// True when the comment, or the top-level comment it hangs under, is hidden.
async fn hidden_thread(data: &AppState, comment: &Comment) -> Result<bool, ApiError> {
    if comment.is_moderated {
        return Ok(true);
    }
    match comment.parent_comment_id {
        Some(top) => Ok(data.repo.get_comment(top).await?.is_moderated),
        None => Ok(false),
    }
}

fn trim(s: &mut String) {
    let t = s.trim();
    if t.len() != s.len() {
        *s = t.to_string();
    }
}

/// Runs the moderator; a rejection is logged before it is returned.
async fn screen(
    data: &AppState,
    user: &User,
    content_type: ContentType,
    text: &str,
) -> Result<(), ApiError> {
    let result = data.moderator.check(text);
    if result.is_allowed {
        return Ok(());
    }
    let reason = result.reason.clone().unwrap_or_default();
    warn!(
        user_id = user.id,
        kind = content_type.as_str(),
        %reason,
        "submission rejected by moderation"
    );
    let log = NewModerationLog {
        user_id: user.id,
        content_type,
        excerpt: excerpt(text),
        reason,
        flagged_words: result.flagged_words.clone().unwrap_or_default(),
    };
    if let Err(e) = data.repo.log_moderation(log).await {
        warn!("moderation log write failed: {e}");
    }
    Err(ApiError::Rejected(result))
}

fn owner_or_moderator(user_id: Id, session: &SessionUser) -> Result<(), ApiError> {
    if user_id == session.user_id || session.role.can_moderate() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You can only change your own content".into()))
    }
}

// ---------------- posts --------------------------------------------

#[utoipa::path(
    get,
    path = "/api/forum/posts",
    params(ListPostsParams),
    responses((status = 200, description = "A page of posts", body = PostListResponse))
)]
pub async fn list_posts(
    data: web::Data<AppState>,
    params: web::Query<ListPostsParams>,
) -> Result<HttpResponse, ApiError> {
    let p = params.into_inner();
    let mut q = PostQuery {
        page: p.page.unwrap_or(1).max(1),
        limit: p.limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE),
        sort: p.sort.unwrap_or_default(),
        post_type: p.post_type,
        ..PostQuery::default()
    };
    let empty = |q: &PostQuery| {
        HttpResponse::Ok().json(PostListResponse {
            posts: vec![],
            pagination: Pagination::new(q.page, q.limit, 0),
        })
    };
    if let Some(ep) = p.episode.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let found = match ep.parse::<Id>() {
            Ok(id) => match data.repo.get_episode(id).await {
                Ok(e) => Some(e),
                Err(RepoError::NotFound) => None,
                Err(e) => return Err(e.into()),
            },
            Err(_) => data.repo.find_episode_by_slug(ep).await?,
        };
        match found {
            Some(e) => q.episode_id = Some(e.id),
            None => return Ok(empty(&q)),
        }
    }
    if let Some(name) = p.author.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match data.repo.find_user_by_username(name).await? {
            Some(u) => q.user_id = Some(u.id),
            None => return Ok(empty(&q)),
        }
    }
    let page = data.repo.list_posts(&q).await?;
    let mut authors = Authors::new(data.repo.as_ref());
    let mut posts = Vec::with_capacity(page.posts.len());
    for post in page.posts {
        posts.push(post_view(data.repo.as_ref(), &mut authors, post).await?);
    }
    let pagination = Pagination::new(q.page, q.limit, page.total);
    Ok(HttpResponse::Ok().json(PostListResponse { posts, pagination }))
}

#[utoipa::path(
    post,
    path = "/api/forum/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Invalid input or rejected by moderation"),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Account banned"),
        (status = 429, description = "Posting too fast")
    )
)]
pub async fn create_post(
    session: SessionUser,
    data: web::Data<AppState>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let mut req = payload.into_inner();
    trim(&mut req.title);
    trim(&mut req.content);
    req.validate()?;
    let CreatePostRequest { title, content, episode_id } = req;
    if let Some(ep) = episode_id {
        match data.repo.get_episode(ep).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => return Err(ApiError::BadRequest("Unknown episode".into())),
            Err(e) => return Err(e.into()),
        }
    }
    check_rate(&data, |rl| rl.allow_post(user.id))?;
    screen(&data, &user, ContentType::Post, &format!("{title}\n{content}")).await?;
    let post = data
        .repo
        .create_post(NewPost { user_id: user.id, episode_id, title, content })
        .await?;
    info!(post_id = post.id, user_id = user.id, "post created");
    let mut authors = Authors::new(data.repo.as_ref());
    let view = post_view(data.repo.as_ref(), &mut authors, post).await?;
    Ok(HttpResponse::Created().json(view))
}

#[utoipa::path(
    get,
    path = "/api/forum/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with its comments and replies", body = PostDetail),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    viewer: Option<SessionUser>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let moderator = can_moderate(&viewer);
    let mut post = visible_post(&data, path.into_inner(), moderator).await?;
    data.repo.increment_views(post.id).await?;
    post.views += 1;
    let repo = data.repo.as_ref();
    let mut authors = Authors::new(repo);
    let mut comments = Vec::new();
    for top in repo.list_comments(post.id, None, moderator).await? {
        let mut replies = Vec::new();
        for r in repo.list_comments(post.id, Some(top.id), moderator).await? {
            replies.push(authors.comment(r).await?);
        }
        comments.push(ThreadComment { comment: authors.comment(top).await?, replies });
    }
    let post = post_view(repo, &mut authors, post).await?;
    Ok(HttpResponse::Ok().json(PostDetail { post, comments }))
}

#[utoipa::path(
    patch,
    path = "/api/forum/posts/{id}",
    request_body = UpdatePostRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = PostView),
        (status = 400, description = "Invalid input or rejected by moderation"),
        (status = 403, description = "Not the author, or banned"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let post = visible_post(&data, path.into_inner(), session.role.can_moderate()).await?;
    if post.user_id != user.id {
        return Err(ApiError::Forbidden("You can only edit your own posts".into()));
    }
    let mut req = payload.into_inner();
    req.title.iter_mut().chain(req.content.iter_mut()).for_each(trim);
    req.validate()?;
    let UpdatePostRequest { title, content } = req;
    if title.is_none() && content.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }
    let combined = format!(
        "{}\n{}",
        title.as_deref().unwrap_or(&post.title),
        content.as_deref().unwrap_or(&post.content)
    );
    screen(&data, &user, ContentType::Post, &combined).await?;
    let post = data.repo.update_post(post.id, title, content).await?;
    let mut authors = Authors::new(data.repo.as_ref());
    Ok(HttpResponse::Ok().json(post_view(data.repo.as_ref(), &mut authors, post).await?))
}

#[utoipa::path(
    delete,
    path = "/api/forum/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post and its comments deleted", body = MessageResponse),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    owner_or_moderator(post.user_id, &session)?;
    data.repo.delete_post(post.id).await?;
    info!(post_id = post.id, by = session.user_id, "post deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Post deleted")))
}

#[utoipa::path(
    post,
    path = "/api/forum/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like toggled", body = LikeToggle),
        (status = 403, description = "Account banned"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn like_post(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let post = visible_post(&data, path.into_inner(), session.role.can_moderate()).await?;
    let toggle = data.repo.toggle_post_like(post.id, user.id).await?;
    if toggle.liked {
        notifications::notify(
            data.repo.as_ref(),
            &data.mailer,
            &data.config.frontend_url,
            &user,
            Event::PostLiked { post: &post },
        )
        .await;
    }
    Ok(HttpResponse::Ok().json(toggle))
}

#[utoipa::path(
    post,
    path = "/api/forum/posts/{id}/moderate",
    request_body = ModerateRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Moderation flag set", body = Post),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn moderate_post(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ModerateRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Moderator | Role::Admin);
    let post = data.repo.set_post_moderated(path.into_inner(), payload.is_moderated).await?;
    info!(
        post_id = post.id,
        by = session.user_id,
        hidden = post.is_moderated,
        "post moderation changed"
    );
    Ok(HttpResponse::Ok().json(post))
}

// ---------------- comments -----------------------------------------

#[utoipa::path(
    post,
    path = "/api/forum/posts/{id}/comments",
    request_body = CreateCommentRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment created", body = CommentView),
        (status = 400, description = "Invalid input or rejected by moderation"),
        (status = 403, description = "Account banned"),
        (status = 404, description = "Post not found"),
        (status = 429, description = "Commenting too fast")
    )
)]
pub async fn create_comment(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let moderator = session.role.can_moderate();
    let post = visible_post(&data, path.into_inner(), moderator).await?;
    let mut req = payload.into_inner();
    trim(&mut req.content);
    req.validate()?;
    let CreateCommentRequest { content, parent_comment_id } = req;
    let target = match parent_comment_id {
        Some(pid) => {
            let parent = match data.repo.get_comment(pid).await {
                Ok(c) => c,
                Err(RepoError::NotFound) => {
                    return Err(ApiError::BadRequest("Parent comment not found".into()))
                }
                Err(e) => return Err(e.into()),
            };
            if parent.post_id != post.id {
                return Err(ApiError::BadRequest("Parent comment belongs to another post".into()));
            }
            if !moderator && hidden_thread(&data, &parent).await? {
                return Err(ApiError::NotFound);
            }
            Some(parent)
        }
        None => None,
    };
    check_rate(&data, |rl| rl.allow_comment(user.id))?;
    screen(&data, &user, ContentType::Comment, &content).await?;
    // Replies nest one level: answering a reply files under its top-level comment.
    let parent_id = target.as_ref().map(|t| t.parent_comment_id.unwrap_or(t.id));
    let comment = data
        .repo
        .create_comment(NewComment {
            post_id: post.id,
            user_id: user.id,
            content,
            parent_comment_id: parent_id,
        })
        .await?;
    let event = match &target {
        Some(parent) => Event::Replied { post: &post, parent, reply: &comment },
        None => Event::Commented { post: &post, comment: &comment },
    };
    let frontend = &data.config.frontend_url;
    notifications::notify(data.repo.as_ref(), &data.mailer, frontend, &user, event).await;
    let mut authors = Authors::new(data.repo.as_ref());
    Ok(HttpResponse::Created().json(authors.comment(comment).await?))
}

#[utoipa::path(
    patch,
    path = "/api/forum/comments/{id}",
    request_body = UpdateCommentRequest,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment updated", body = CommentView),
        (status = 400, description = "Invalid input or rejected by moderation"),
        (status = 403, description = "Not the author, or banned"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let comment = data.repo.get_comment(path.into_inner()).await?;
    if comment.user_id != user.id {
        return Err(ApiError::Forbidden("You can only edit your own comments".into()));
    }
    let mut req = payload.into_inner();
    trim(&mut req.content);
    req.validate()?;
    let content = req.content;
    screen(&data, &user, ContentType::Comment, &content).await?;
    let comment = data.repo.update_comment(comment.id, content).await?;
    let mut authors = Authors::new(data.repo.as_ref());
    Ok(HttpResponse::Ok().json(authors.comment(comment).await?))
}

#[utoipa::path(
    delete,
    path = "/api/forum/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment and its replies deleted", body = MessageResponse),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.get_comment(path.into_inner()).await?;
    owner_or_moderator(comment.user_id, &session)?;
    let removed = data.repo.delete_comment(comment.id).await?;
    info!(comment_id = comment.id, removed, by = session.user_id, "comment deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Comment deleted")))
}

#[utoipa::path(
    post,
    path = "/api/forum/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Like toggled", body = LikeToggle),
        (status = 403, description = "Account banned"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn like_comment(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    let moderator = session.role.can_moderate();
    let comment = data.repo.get_comment(path.into_inner()).await?;
    if comment.is_moderated && !moderator {
        return Err(ApiError::NotFound);
    }
    let post = visible_post(&data, comment.post_id, moderator).await?;
    let toggle = data.repo.toggle_comment_like(comment.id, user.id).await?;
    if toggle.liked {
        notifications::notify(
            data.repo.as_ref(),
            &data.mailer,
            &data.config.frontend_url,
            &user,
            Event::CommentLiked { post: &post, comment: &comment },
        )
        .await;
    }
    Ok(HttpResponse::Ok().json(toggle))
}

#[utoipa::path(
    post,
    path = "/api/forum/comments/{id}/moderate",
    request_body = ModerateRequest,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Moderation flag set", body = Comment),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn moderate_comment(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ModerateRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Moderator | Role::Admin);
    let comment = data.repo.set_comment_moderated(path.into_inner(), payload.is_moderated).await?;
    info!(
        comment_id = comment.id,
        by = session.user_id,
        hidden = comment.is_moderated,
        "comment moderation changed"
    );
    Ok(HttpResponse::Ok().json(comment))
}

// ---------------- episodes & people --------------------------------

#[utoipa::path(
    get,
    path = "/api/forum/episodes",
    responses((status = 200, description = "Episode catalog", body = [Episode]))
)]
pub async fn list_episodes(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_episodes().await?))
}

#[utoipa::path(
    get,
    path = "/api/forum/episodes/{slug}",
    params(("slug" = String, Path, description = "Episode slug")),
    responses(
        (status = 200, description = "Episode", body = Episode),
        (status = 404, description = "Unknown slug")
    )
)]
pub async fn get_episode(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let episode = data.repo.find_episode_by_slug(&path).await?.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(episode))
}

#[utoipa::path(
    get,
    path = "/api/forum/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfile),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_profile(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.find_user_by_username(&path).await?.ok_or(ApiError::NotFound)?;
    let posts = data
        .repo
        .list_posts(&PostQuery { limit: 1, user_id: Some(user.id), ..PostQuery::default() })
        .await?;
    Ok(HttpResponse::Ok().json(PublicProfile {
        id: user.id,
        username: user.username,
        role: user.role,
        bio: user.bio,
        avatar_url: user.avatar_url,
        post_count: posts.total,
        created_at: user.created_at,
    }))
}

// ---------------- staff --------------------------------------------

#[utoipa::path(
    get,
    path = "/api/forum/moderation/logs",
    params(LogsParams),
    responses(
        (status = 200, description = "Recent moderation rejections", body = [ModerationLog]),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn moderation_logs(
    session: SessionUser,
    data: web::Data<AppState>,
    params: web::Query<LogsParams>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Moderator | Role::Admin);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    Ok(HttpResponse::Ok().json(data.repo.list_moderation_logs(limit).await?))
}

#[utoipa::path(
    post,
    path = "/api/forum/users/{id}/ban",
    request_body = BanRequest,
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Ban state changed", body = UserView),
        (status = 400, description = "Cannot ban yourself"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn ban_user(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<BanRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let target = path.into_inner();
    if target == session.user_id {
        return Err(ApiError::BadRequest("You cannot ban yourself".into()));
    }
    let user = data.repo.set_banned(target, payload.banned).await?;
    if user.is_banned {
        data.sessions.destroy_for_user(user.id);
    }
    info!(user_id = user.id, banned = user.is_banned, by = session.user_id, "ban state changed");
    Ok(HttpResponse::Ok().json(UserView::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/forum/users/{id}/role",
    request_body = RoleRequest,
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Role changed", body = UserView),
        (status = 400, description = "Cannot change your own role"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn set_role(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<RoleRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let target = path.into_inner();
    if target == session.user_id {
        return Err(ApiError::BadRequest("You cannot change your own role".into()));
    }
    let user = data.repo.set_role(target, payload.role).await?;
    // Sessions carry the role, so the member signs in again to pick it up.
    data.sessions.destroy_for_user(user.id);
    info!(user_id = user.id, role = user.role.as_str(), by = session.user_id, "role changed");
    Ok(HttpResponse::Ok().json(UserView::from(&user)))
}

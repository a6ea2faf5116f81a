use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::Role;

pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(AuthProvider::Local),
            "google" => Some(AuthProvider::Google),
            _ => None,
        }
    }
}

/// Stored user document. Carries credentials, so it is never returned to
/// clients directly; see [`UserView`] and [`PublicProfile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_banned: bool,
    pub auth_provider: AuthProvider,
    pub oauth_id: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email_notifications: bool,
    pub verification_token_hash: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user's own account, as returned by `/api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_banned: bool,
    pub auth_provider: AuthProvider,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email_notifications: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            role: u.role,
            is_verified: u.is_verified,
            is_banned: u.is_banned,
            auth_provider: u.auth_provider,
            bio: u.bio.clone(),
            avatar_url: u.avatar_url.clone(),
            email_notifications: u.email_notifications,
            created_at: u.created_at,
        }
    }
}

/// What other forum members can see about a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Id,
    pub username: String,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub post_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub auth_provider: AuthProvider,
    pub oauth_id: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email_notifications: Option<bool>,
}

/// Author details embedded in post and comment payloads.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Id,
    pub username: String,
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl From<&User> for AuthorSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            avatar_url: u.avatar_url.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: Id,
    pub slug: String,
    pub title: String,
    pub episode_number: i32,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewEpisode {
    pub slug: String,
    pub title: String,
    pub episode_number: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSummary {
    pub id: Id,
    pub slug: String,
    pub title: String,
    pub episode_number: i32,
}

impl From<&Episode> for EpisodeSummary {
    fn from(e: &Episode) -> Self {
        Self {
            id: e.id,
            slug: e.slug.clone(),
            title: e.title.clone(),
            episode_number: e.episode_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    General,
    Episode,
}

impl PostType {
    pub fn for_episode(episode_id: Option<Id>) -> Self {
        if episode_id.is_some() {
            PostType::Episode
        } else {
            PostType::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::General => "general",
            PostType::Episode => "episode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(PostType::General),
            "episode" => Some(PostType::Episode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id,
    pub user_id: Id,
    pub episode_id: Option<Id>,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub comment_count: i64,
    pub views: i64,
    pub is_moderated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Id,
    pub episode_id: Option<Id>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Most recent activity (post creation or latest comment) first.
    #[default]
    #[serde(alias = "recent")]
    Activity,
    Popular,
    #[serde(alias = "new")]
    Newest,
}

#[derive(Debug, Clone)]
pub struct PostQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: SortMode,
    pub post_type: Option<PostType>,
    pub episode_id: Option<Id>,
    pub user_id: Option<Id>,
    pub include_moderated: bool,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            sort: SortMode::default(),
            post_type: None,
            episode_id: None,
            user_id: None,
            include_moderated: false,
        }
    }
}

impl PostQuery {
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub content: String,
    pub parent_comment_id: Option<Id>,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub is_moderated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub user_id: Id,
    pub content: String,
    pub parent_comment_id: Option<Id>,
}

/// Result of a like toggle on a post or comment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Comment,
    Reply,
    PostLike,
    CommentLike,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Comment => "comment",
            NotificationKind::Reply => "reply",
            NotificationKind::PostLike => "post_like",
            NotificationKind::CommentLike => "comment_like",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(NotificationKind::Comment),
            "reply" => Some(NotificationKind::Reply),
            "post_like" => Some(NotificationKind::PostLike),
            "comment_like" => Some(NotificationKind::CommentLike),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    pub actor_id: Id,
    pub actor_username: String,
    pub kind: NotificationKind,
    pub post_id: Id,
    pub comment_id: Option<Id>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Id,
    pub actor_id: Id,
    pub actor_username: String,
    pub kind: NotificationKind,
    pub post_id: Id,
    pub comment_id: Option<Id>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationQuery {
    pub unread_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Comment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(ContentType::Post),
            "comment" => Some(ContentType::Comment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerationLog {
    pub id: Id,
    pub user_id: Id,
    pub content_type: ContentType,
    pub excerpt: String,
    pub reason: String,
    pub flagged_words: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewModerationLog {
    pub user_id: Id,
    pub content_type: ContentType,
    pub excerpt: String,
    pub reason: String,
    pub flagged_words: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Partnership,
    Pilot,
    Sponsorship,
    Careers,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Partnership => "partnership",
            Intent::Pilot => "pilot",
            Intent::Sponsorship => "sponsorship",
            Intent::Careers => "careers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "partnership" => Some(Intent::Partnership),
            "pilot" => Some(Intent::Pilot),
            "sponsorship" => Some(Intent::Sponsorship),
            "careers" => Some(Intent::Careers),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Intent::Partnership => "Partnership",
            Intent::Pilot => "Pilot program",
            Intent::Sponsorship => "Sponsorship",
            Intent::Careers => "Careers",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub organization: Option<String>,
    pub message: String,
    pub intent: Intent,
    pub is_read: bool,
    pub is_replied: bool,
    pub reply_message: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "Organization must be at most 200 characters"))]
    pub organization: Option<String>,
    #[validate(length(min = 10, max = 5000, message = "Message must be 10-5000 characters"))]
    pub message: String,
    pub intent: Intent,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    pub is_read: Option<bool>,
    pub is_replied: Option<bool>,
    #[serde(skip)]
    pub reply_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub intent: Option<Intent>,
    pub unread_only: bool,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::Role;
use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the email or username is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_verification(&self, token_hash: &str) -> RepoResult<Option<User>>;
    async fn set_verification(
        &self,
        id: Id,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// Marks the account verified and clears any pending token.
    async fn mark_verified(&self, id: Id) -> RepoResult<User>;
    async fn link_oauth(&self, id: Id, provider_id: &str) -> RepoResult<User>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
    async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<User>;
    async fn set_role(&self, id: Id, role: Role) -> RepoResult<User>;
}

#[async_trait]
pub trait EpisodeRepo: Send + Sync {
    async fn list_episodes(&self) -> RepoResult<Vec<Episode>>;
    async fn get_episode(&self, id: Id) -> RepoResult<Episode>;
    async fn find_episode_by_slug(&self, slug: &str) -> RepoResult<Option<Episode>>;
    /// Inserts or replaces the catalog entry with the same slug.
    async fn upsert_episode(&self, new: NewEpisode) -> RepoResult<Episode>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn list_posts(&self, q: &PostQuery) -> RepoResult<PostPage>;
    async fn update_post(
        &self,
        id: Id,
        title: Option<String>,
        content: Option<String>,
    ) -> RepoResult<Post>;
    /// Removes the post and every comment under it.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn toggle_post_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle>;
    async fn increment_views(&self, id: Id) -> RepoResult<()>;
    async fn set_post_moderated(&self, id: Id, moderated: bool) -> RepoResult<Post>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Inserts the comment, then bumps the post's comment count and activity time.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment>;
    /// Comments under `parent` (top level when `None`), oldest first.
    async fn list_comments(
        &self,
        post_id: Id,
        parent: Option<Id>,
        include_moderated: bool,
    ) -> RepoResult<Vec<Comment>>;
    /// Removes the comment and its replies; returns how many were removed.
    async fn delete_comment(&self, id: Id) -> RepoResult<u64>;
    async fn toggle_comment_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle>;
    async fn set_comment_moderated(&self, id: Id, moderated: bool) -> RepoResult<Comment>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification>;
    /// Newest first.
    async fn list_notifications(
        &self,
        user_id: Id,
        q: &NotificationQuery,
    ) -> RepoResult<Vec<Notification>>;
    async fn count_unread(&self, user_id: Id) -> RepoResult<u64>;
    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification>;
    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64>;
}

#[async_trait]
pub trait ModerationLogRepo: Send + Sync {
    async fn log_moderation(&self, new: NewModerationLog) -> RepoResult<ModerationLog>;
    /// Newest first.
    async fn list_moderation_logs(&self, limit: usize) -> RepoResult<Vec<ModerationLog>>;
}

/// Contact forms live in both the main store and the admin store.
#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn create_contact(&self, new: NewContact) -> RepoResult<ContactForm>;
    /// Writes a copy keyed by the form's existing id, replacing any earlier copy.
    async fn mirror_contact(&self, form: &ContactForm) -> RepoResult<()>;
    /// Newest first.
    async fn list_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<ContactForm>>;
    async fn get_contact(&self, id: Id) -> RepoResult<ContactForm>;
    async fn update_contact(&self, id: Id, upd: ContactUpdate) -> RepoResult<ContactForm>;
}

pub trait Repo:
    UserRepo
    + EpisodeRepo
    + PostRepo
    + CommentRepo
    + NotificationRepo
    + ModerationLogRepo
    + ContactRepo
{
}

impl<T> Repo for T where
    T: UserRepo
        + EpisodeRepo
        + PostRepo
        + CommentRepo
        + NotificationRepo
        + ModerationLogRepo
        + ContactRepo
{
}

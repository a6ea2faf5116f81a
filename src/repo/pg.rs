use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use super::*;

const USER_COLS: &str = "id, username, email, password_hash, role, is_verified, is_banned, auth_provider, \
    oauth_id, bio, avatar_url, email_notifications, verification_token_hash, verification_expires_at, created_at";
const EPISODE_COLS: &str = "id, slug, title, episode_number, description, tags, published_at";
const POST_COLS: &str = "id, user_id, episode_id, title, content, post_type, likes, liked_by, comment_count, \
    views, is_moderated, created_at, updated_at, last_activity_at";
const COMMENT_COLS: &str = "id, post_id, user_id, content, parent_comment_id, likes, liked_by, is_moderated, \
    created_at, updated_at";
const NOTIFICATION_COLS: &str = "id, user_id, actor_id, actor_username, kind, post_id, comment_id, message, \
    is_read, created_at";
const MODLOG_COLS: &str = "id, user_id, content_type, excerpt, reason, flagged_words, created_at";
const CONTACT_COLS: &str = "id, name, email, organization, message, intent, is_read, is_replied, \
    reply_message, replied_at, created_at";

fn db_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
            RepoError::Conflict("Duplicate value".into())
        }
        other => RepoError::Internal(other.to_string()),
    }
}

fn decode_err(e: sqlx::Error) -> RepoError {
    RepoError::Internal(format!("row decode: {e}"))
}

fn enum_col<T>(row: &PgRow, col: &str, parse: fn(&str) -> Option<T>) -> RepoResult<T> {
    let raw: String = row.try_get(col).map_err(decode_err)?;
    parse(&raw).ok_or_else(|| RepoError::Internal(format!("unexpected {col} value '{raw}'")))
}

fn user_from_row(row: &PgRow) -> RepoResult<User> {
    Ok(User {
        id: row.try_get("id").map_err(decode_err)?,
        username: row.try_get("username").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        password_hash: row.try_get("password_hash").map_err(decode_err)?,
        role: enum_col(row, "role", Role::parse)?,
        is_verified: row.try_get("is_verified").map_err(decode_err)?,
        is_banned: row.try_get("is_banned").map_err(decode_err)?,
        auth_provider: enum_col(row, "auth_provider", AuthProvider::parse)?,
        oauth_id: row.try_get("oauth_id").map_err(decode_err)?,
        bio: row.try_get("bio").map_err(decode_err)?,
        avatar_url: row.try_get("avatar_url").map_err(decode_err)?,
        email_notifications: row.try_get("email_notifications").map_err(decode_err)?,
        verification_token_hash: row.try_get("verification_token_hash").map_err(decode_err)?,
        verification_expires_at: row.try_get("verification_expires_at").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn episode_from_row(row: &PgRow) -> RepoResult<Episode> {
    Ok(Episode {
        id: row.try_get("id").map_err(decode_err)?,
        slug: row.try_get("slug").map_err(decode_err)?,
        title: row.try_get("title").map_err(decode_err)?,
        episode_number: row.try_get("episode_number").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        tags: row.try_get("tags").map_err(decode_err)?,
        published_at: row.try_get("published_at").map_err(decode_err)?,
    })
}

fn post_from_row(row: &PgRow) -> RepoResult<Post> {
    Ok(Post {
        id: row.try_get("id").map_err(decode_err)?,
        user_id: row.try_get("user_id").map_err(decode_err)?,
        episode_id: row.try_get("episode_id").map_err(decode_err)?,
        title: row.try_get("title").map_err(decode_err)?,
        content: row.try_get("content").map_err(decode_err)?,
        post_type: enum_col(row, "post_type", PostType::parse)?,
        likes: row.try_get("likes").map_err(decode_err)?,
        liked_by: row.try_get("liked_by").map_err(decode_err)?,
        comment_count: row.try_get("comment_count").map_err(decode_err)?,
        views: row.try_get("views").map_err(decode_err)?,
        is_moderated: row.try_get("is_moderated").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
        updated_at: row.try_get("updated_at").map_err(decode_err)?,
        last_activity_at: row.try_get("last_activity_at").map_err(decode_err)?,
    })
}

fn comment_from_row(row: &PgRow) -> RepoResult<Comment> {
    Ok(Comment {
        id: row.try_get("id").map_err(decode_err)?,
        post_id: row.try_get("post_id").map_err(decode_err)?,
        user_id: row.try_get("user_id").map_err(decode_err)?,
        content: row.try_get("content").map_err(decode_err)?,
        parent_comment_id: row.try_get("parent_comment_id").map_err(decode_err)?,
        likes: row.try_get("likes").map_err(decode_err)?,
        liked_by: row.try_get("liked_by").map_err(decode_err)?,
        is_moderated: row.try_get("is_moderated").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
        updated_at: row.try_get("updated_at").map_err(decode_err)?,
    })
}

fn notification_from_row(row: &PgRow) -> RepoResult<Notification> {
    Ok(Notification {
        id: row.try_get("id").map_err(decode_err)?,
        user_id: row.try_get("user_id").map_err(decode_err)?,
        actor_id: row.try_get("actor_id").map_err(decode_err)?,
        actor_username: row.try_get("actor_username").map_err(decode_err)?,
        kind: enum_col(row, "kind", NotificationKind::parse)?,
        post_id: row.try_get("post_id").map_err(decode_err)?,
        comment_id: row.try_get("comment_id").map_err(decode_err)?,
        message: row.try_get("message").map_err(decode_err)?,
        is_read: row.try_get("is_read").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn modlog_from_row(row: &PgRow) -> RepoResult<ModerationLog> {
    Ok(ModerationLog {
        id: row.try_get("id").map_err(decode_err)?,
        user_id: row.try_get("user_id").map_err(decode_err)?,
        content_type: enum_col(row, "content_type", ContentType::parse)?,
        excerpt: row.try_get("excerpt").map_err(decode_err)?,
        reason: row.try_get("reason").map_err(decode_err)?,
        flagged_words: row.try_get("flagged_words").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn contact_from_row(row: &PgRow) -> RepoResult<ContactForm> {
    Ok(ContactForm {
        id: row.try_get("id").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        email: row.try_get("email").map_err(decode_err)?,
        organization: row.try_get("organization").map_err(decode_err)?,
        message: row.try_get("message").map_err(decode_err)?,
        intent: enum_col(row, "intent", Intent::parse)?,
        is_read: row.try_get("is_read").map_err(decode_err)?,
        is_replied: row.try_get("is_replied").map_err(decode_err)?,
        reply_message: row.try_get("reply_message").map_err(decode_err)?,
        replied_at: row.try_get("replied_at").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn like_from_row(row: &PgRow) -> RepoResult<LikeToggle> {
    Ok(LikeToggle {
        liked: row.try_get("liked").map_err(decode_err)?,
        likes: row.try_get("likes").map_err(decode_err)?,
    })
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Creates tables and indexes; safe to run on every boot.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn user_where(&self, clause: &str, arg: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLS} FROM users WHERE {clause}"))
            .bind(arg)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_user(&self, id: Id, set: &str) -> RepoResult<User> {
        let row = sqlx::query(&format!("UPDATE users SET {set} WHERE id = $1 RETURNING {USER_COLS}"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        user_from_row(&row)
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let email = new.email.to_lowercase();
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(RepoError::Conflict("Email already registered".into()));
        }
        if self.find_user_by_username(&new.username).await?.is_some() {
            return Err(RepoError::Conflict("Username already taken".into()));
        }
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, password_hash, auth_provider, oauth_id, avatar_url, is_verified) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {USER_COLS}"
        ))
        .bind(&new.username)
        .bind(&email)
        .bind(&new.password_hash)
        .bind(new.auth_provider.as_str())
        .bind(&new.oauth_id)
        .bind(&new.avatar_url)
        .bind(new.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let row = sqlx::query(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.user_where("email = lower($1)", email).await
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.user_where("lower(username) = lower($1)", username).await
    }

    async fn find_user_by_verification(&self, token_hash: &str) -> RepoResult<Option<User>> {
        self.user_where("verification_token_hash = $1", token_hash).await
    }

    async fn set_verification(
        &self,
        id: Id,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let res = sqlx::query(
            "UPDATE users SET verification_token_hash = $2, verification_expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Id) -> RepoResult<User> {
        self.update_user(
            id,
            "is_verified = TRUE, verification_token_hash = NULL, verification_expires_at = NULL",
        )
        .await
    }

    async fn link_oauth(&self, id: Id, provider_id: &str) -> RepoResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET oauth_id = $2, is_verified = TRUE, verification_token_hash = NULL, \
             verification_expires_at = NULL WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        user_from_row(&row)
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        if let Some(ref name) = upd.username {
            if let Some(other) = self.find_user_by_username(name).await? {
                if other.id != id {
                    return Err(RepoError::Conflict("Username already taken".into()));
                }
            }
        }
        let row = sqlx::query(&format!(
            "UPDATE users SET username = COALESCE($2, username), \
             bio = CASE WHEN $3::text IS NULL THEN bio ELSE NULLIF($3, '') END, \
             avatar_url = CASE WHEN $4::text IS NULL THEN avatar_url ELSE NULLIF($4, '') END, \
             email_notifications = COALESCE($5, email_notifications) \
             WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(id)
        .bind(&upd.username)
        .bind(&upd.bio)
        .bind(&upd.avatar_url)
        .bind(upd.email_notifications)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        user_from_row(&row)
    }

    async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<User> {
        let row = sqlx::query(&format!("UPDATE users SET is_banned = $2 WHERE id = $1 RETURNING {USER_COLS}"))
            .bind(id)
            .bind(banned)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        user_from_row(&row)
    }

    async fn set_role(&self, id: Id, role: Role) -> RepoResult<User> {
        let row = sqlx::query(&format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLS}"))
            .bind(id)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        user_from_row(&row)
    }
}

#[async_trait]
impl EpisodeRepo for PgRepo {
    async fn list_episodes(&self) -> RepoResult<Vec<Episode>> {
        let rows = sqlx::query(&format!("SELECT {EPISODE_COLS} FROM episodes ORDER BY episode_number"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(episode_from_row).collect()
    }

    async fn get_episode(&self, id: Id) -> RepoResult<Episode> {
        let row = sqlx::query(&format!("SELECT {EPISODE_COLS} FROM episodes WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        episode_from_row(&row)
    }

    async fn find_episode_by_slug(&self, slug: &str) -> RepoResult<Option<Episode>> {
        let row = sqlx::query(&format!("SELECT {EPISODE_COLS} FROM episodes WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(episode_from_row).transpose()
    }

    async fn upsert_episode(&self, new: NewEpisode) -> RepoResult<Episode> {
        let row = sqlx::query(&format!(
            "INSERT INTO episodes (slug, title, episode_number, description, tags, published_at) \
             VALUES ($1,$2,$3,$4,$5,$6) \
             ON CONFLICT (slug) DO UPDATE SET title = EXCLUDED.title, episode_number = EXCLUDED.episode_number, \
             description = EXCLUDED.description, tags = EXCLUDED.tags, published_at = EXCLUDED.published_at \
             RETURNING {EPISODE_COLS}"
        ))
        .bind(&new.slug)
        .bind(&new.title)
        .bind(new.episode_number)
        .bind(&new.description)
        .bind(&new.tags)
        .bind(new.published_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        episode_from_row(&row)
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        if let Some(ep) = new.episode_id {
            self.get_episode(ep).await?;
        }
        let row = sqlx::query(&format!(
            "INSERT INTO posts (user_id, episode_id, title, content, post_type) VALUES ($1,$2,$3,$4,$5) \
             RETURNING {POST_COLS}"
        ))
        .bind(new.user_id)
        .bind(new.episode_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(PostType::for_episode(new.episode_id).as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        post_from_row(&row)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        let row = sqlx::query(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        post_from_row(&row)
    }

    async fn list_posts(&self, q: &PostQuery) -> RepoResult<PostPage> {
        let filter = "($1 OR NOT is_moderated) AND ($2::text IS NULL OR post_type = $2) \
                      AND ($3::bigint IS NULL OR episode_id = $3) AND ($4::bigint IS NULL OR user_id = $4)";
        let order = match q.sort {
            SortMode::Activity => "last_activity_at DESC, id DESC",
            SortMode::Popular => "likes DESC, comment_count DESC, created_at DESC, id DESC",
            SortMode::Newest => "created_at DESC, id DESC",
        };
        let post_type = q.post_type.map(|t| t.as_str());
        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM posts WHERE {filter}"))
            .bind(q.include_moderated)
            .bind(post_type)
            .bind(q.episode_id)
            .bind(q.user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .try_get("total")
            .map_err(decode_err)?;
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLS} FROM posts WHERE {filter} ORDER BY {order} LIMIT $5 OFFSET $6"
        ))
        .bind(q.include_moderated)
        .bind(post_type)
        .bind(q.episode_id)
        .bind(q.user_id)
        .bind(q.limit as i64)
        .bind(q.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let posts = rows.iter().map(post_from_row).collect::<RepoResult<Vec<_>>>()?;
        Ok(PostPage { posts, total: total.max(0) as u64 })
    }

    async fn update_post(
        &self,
        id: Id,
        title: Option<String>,
        content: Option<String>,
    ) -> RepoResult<Post> {
        let row = sqlx::query(&format!(
            "UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content), updated_at = now() \
             WHERE id = $1 RETURNING {POST_COLS}"
        ))
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        post_from_row(&row)
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn toggle_post_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        let row = sqlx::query(
            "UPDATE posts SET \
               likes = CASE WHEN $2 = ANY(liked_by) THEN GREATEST(likes - 1, 0) ELSE likes + 1 END, \
               liked_by = CASE WHEN $2 = ANY(liked_by) THEN array_remove(liked_by, $2) ELSE array_append(liked_by, $2) END \
             WHERE id = $1 RETURNING likes, ($2 = ANY(liked_by)) AS liked",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        like_from_row(&row)
    }

    async fn increment_views(&self, id: Id) -> RepoResult<()> {
        sqlx::query("UPDATE posts SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_post_moderated(&self, id: Id, moderated: bool) -> RepoResult<Post> {
        let row = sqlx::query(&format!("UPDATE posts SET is_moderated = $2 WHERE id = $1 RETURNING {POST_COLS}"))
            .bind(id)
            .bind(moderated)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        post_from_row(&row)
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        self.get_post(new.post_id).await?;
        if let Some(parent) = new.parent_comment_id {
            let parent = self.get_comment(parent).await?;
            if parent.post_id != new.post_id {
                return Err(RepoError::NotFound);
            }
        }
        let row = sqlx::query(&format!(
            "INSERT INTO comments (post_id, user_id, content, parent_comment_id) VALUES ($1,$2,$3,$4) \
             RETURNING {COMMENT_COLS}"
        ))
        .bind(new.post_id)
        .bind(new.user_id)
        .bind(&new.content)
        .bind(new.parent_comment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let comment = comment_from_row(&row)?;
        sqlx::query(
            "UPDATE posts SET comment_count = comment_count + 1, last_activity_at = $2 WHERE id = $1",
        )
        .bind(new.post_id)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(comment)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        comment_from_row(&row)
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        let row = sqlx::query(&format!(
            "UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 RETURNING {COMMENT_COLS}"
        ))
        .bind(id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        comment_from_row(&row)
    }

    async fn list_comments(
        &self,
        post_id: Id,
        parent: Option<Id>,
        include_moderated: bool,
    ) -> RepoResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLS} FROM comments WHERE post_id = $1 \
             AND parent_comment_id IS NOT DISTINCT FROM $2 AND ($3 OR NOT is_moderated) \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(post_id)
        .bind(parent)
        .bind(include_moderated)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<u64> {
        let rows = sqlx::query("DELETE FROM comments WHERE id = $1 OR parent_comment_id = $1 RETURNING post_id")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let Some(first) = rows.first() else { return Err(RepoError::NotFound) };
        let post_id: Id = first.try_get("post_id").map_err(decode_err)?;
        let removed = rows.len() as i64;
        sqlx::query("UPDATE posts SET comment_count = GREATEST(comment_count - $2, 0) WHERE id = $1")
            .bind(post_id)
            .bind(removed)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(removed as u64)
    }

    async fn toggle_comment_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        let row = sqlx::query(
            "UPDATE comments SET \
               likes = CASE WHEN $2 = ANY(liked_by) THEN GREATEST(likes - 1, 0) ELSE likes + 1 END, \
               liked_by = CASE WHEN $2 = ANY(liked_by) THEN array_remove(liked_by, $2) ELSE array_append(liked_by, $2) END \
             WHERE id = $1 RETURNING likes, ($2 = ANY(liked_by)) AS liked",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        like_from_row(&row)
    }

    async fn set_comment_moderated(&self, id: Id, moderated: bool) -> RepoResult<Comment> {
        let row = sqlx::query(&format!(
            "UPDATE comments SET is_moderated = $2 WHERE id = $1 RETURNING {COMMENT_COLS}"
        ))
        .bind(id)
        .bind(moderated)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        comment_from_row(&row)
    }
}

#[async_trait]
impl NotificationRepo for PgRepo {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notifications (user_id, actor_id, actor_username, kind, post_id, comment_id, message) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {NOTIFICATION_COLS}"
        ))
        .bind(new.user_id)
        .bind(new.actor_id)
        .bind(&new.actor_username)
        .bind(new.kind.as_str())
        .bind(new.post_id)
        .bind(new.comment_id)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        notification_from_row(&row)
    }

    async fn list_notifications(
        &self,
        user_id: Id,
        q: &NotificationQuery,
    ) -> RepoResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
             AND ($3::timestamptz IS NULL OR created_at > $3) ORDER BY created_at DESC, id DESC LIMIT $4"
        ))
        .bind(user_id)
        .bind(q.unread_only)
        .bind(q.since)
        .bind(q.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn count_unread(&self, user_id: Id) -> RepoResult<u64> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM notifications WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?
            .try_get("n")
            .map_err(decode_err)?;
        Ok(n.max(0) as u64)
    }

    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification> {
        let row = sqlx::query(&format!(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {NOTIFICATION_COLS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        notification_from_row(&row)
    }

    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
        let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl ModerationLogRepo for PgRepo {
    async fn log_moderation(&self, new: NewModerationLog) -> RepoResult<ModerationLog> {
        let row = sqlx::query(&format!(
            "INSERT INTO moderation_logs (user_id, content_type, excerpt, reason, flagged_words) \
             VALUES ($1,$2,$3,$4,$5) RETURNING {MODLOG_COLS}"
        ))
        .bind(new.user_id)
        .bind(new.content_type.as_str())
        .bind(&new.excerpt)
        .bind(&new.reason)
        .bind(&new.flagged_words)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        modlog_from_row(&row)
    }

    async fn list_moderation_logs(&self, limit: usize) -> RepoResult<Vec<ModerationLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {MODLOG_COLS} FROM moderation_logs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(modlog_from_row).collect()
    }
}

#[async_trait]
impl ContactRepo for PgRepo {
    async fn create_contact(&self, new: NewContact) -> RepoResult<ContactForm> {
        let row = sqlx::query(&format!(
            "INSERT INTO contact_forms (name, email, organization, message, intent) VALUES ($1,$2,$3,$4,$5) \
             RETURNING {CONTACT_COLS}"
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.organization)
        .bind(&new.message)
        .bind(new.intent.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        contact_from_row(&row)
    }

    async fn mirror_contact(&self, form: &ContactForm) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO contact_forms (id, name, email, organization, message, intent, is_read, is_replied, \
             reply_message, replied_at, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email, \
             organization = EXCLUDED.organization, message = EXCLUDED.message, intent = EXCLUDED.intent, \
             is_read = EXCLUDED.is_read, is_replied = EXCLUDED.is_replied, \
             reply_message = EXCLUDED.reply_message, replied_at = EXCLUDED.replied_at",
        )
        .bind(form.id)
        .bind(&form.name)
        .bind(&form.email)
        .bind(&form.organization)
        .bind(&form.message)
        .bind(form.intent.as_str())
        .bind(form.is_read)
        .bind(form.is_replied)
        .bind(&form.reply_message)
        .bind(form.replied_at)
        .bind(form.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<ContactForm>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTACT_COLS} FROM contact_forms WHERE ($1::text IS NULL OR intent = $1) \
             AND (NOT $2 OR NOT is_read) ORDER BY created_at DESC, id DESC"
        ))
        .bind(filter.intent.map(|i| i.as_str()))
        .bind(filter.unread_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(contact_from_row).collect()
    }

    async fn get_contact(&self, id: Id) -> RepoResult<ContactForm> {
        let row = sqlx::query(&format!("SELECT {CONTACT_COLS} FROM contact_forms WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        contact_from_row(&row)
    }

    async fn update_contact(&self, id: Id, upd: ContactUpdate) -> RepoResult<ContactForm> {
        let row = sqlx::query(&format!(
            "UPDATE contact_forms SET is_read = COALESCE($2, is_read), \
             is_replied = CASE WHEN $4::text IS NOT NULL THEN TRUE ELSE COALESCE($3, is_replied) END, \
             reply_message = COALESCE($4, reply_message), \
             replied_at = CASE WHEN $4::text IS NOT NULL THEN now() ELSE replied_at END \
             WHERE id = $1 RETURNING {CONTACT_COLS}"
        ))
        .bind(id)
        .bind(upd.is_read)
        .bind(upd.is_replied)
        .bind(&upd.reply_message)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        contact_from_row(&row)
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::*;

const SNAPSHOT_FILE: &str = "state.json";

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct State {
    users: HashMap<Id, User>,
    episodes: HashMap<Id, Episode>,
    posts: HashMap<Id, Post>,
    comments: HashMap<Id, Comment>,
    notifications: HashMap<Id, Notification>,
    moderation_logs: HashMap<Id, ModerationLog>,
    contacts: HashMap<Id, ContactForm>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, id: Id) -> RepoResult<&mut User> {
        self.users.get_mut(&id).ok_or(RepoError::NotFound)
    }

    fn post_mut(&mut self, id: Id) -> RepoResult<&mut Post> {
        self.posts.get_mut(&id).ok_or(RepoError::NotFound)
    }

    fn comment_mut(&mut self, id: Id) -> RepoResult<&mut Comment> {
        self.comments.get_mut(&id).ok_or(RepoError::NotFound)
    }

    fn username_taken(&self, username: &str, except: Option<Id>) -> bool {
        self.users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(username) && Some(u.id) != except)
    }
}

/// Flips `user_id` in `liked_by` and moves the counter with it.
fn toggle(liked_by: &mut Vec<Id>, likes: &mut i64, user_id: Id) -> LikeToggle {
    if let Some(pos) = liked_by.iter().position(|u| *u == user_id) {
        liked_by.remove(pos);
        *likes = (*likes - 1).max(0);
        LikeToggle { liked: false, likes: *likes }
    } else {
        liked_by.push(user_id);
        *likes += 1;
        LikeToggle { liked: true, likes: *likes }
    }
}

/// Document store kept in memory and snapshotted to a JSON file after every write.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Opens (or starts) the store persisted under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(SNAPSHOT_FILE);
        let state = Self::load_state_from(&path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(Arc::new(path)),
        }
    }

    /// A store that never touches disk.
    pub fn ephemeral() -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!("Loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    warn!("Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            },
            Err(e) => {
                info!("No snapshot at '{}': {e}. Starting empty.", path.display());
                State::default()
            }
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn view<T>(&self, f: impl FnOnce(&State) -> RepoResult<T>) -> RepoResult<T> {
        let s = self.read()?;
        f(&s)
    }

    /// Applies `f` under the write lock, then persists once the lock is released.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
        let out = {
            let mut s = self.write()?;
            f(&mut s)?
        };
        self.persist();
        Ok(out)
    }

    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let bytes = match self.read().map(|s| serde_json::to_vec_pretty(&*s)) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!("Failed to serialize snapshot: {e}");
                return;
            }
            Err(e) => {
                warn!("Failed to read state for snapshot: {e}");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(path.as_path(), bytes) {
            warn!("Failed to write snapshot '{}': {e}", path.display());
        }
    }
}

impl Default for InMemRepo {
    fn default() -> Self {
        Self::ephemeral()
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        self.mutate(|s| {
            let email = new.email.to_lowercase();
            if s.users.values().any(|u| u.email == email) {
                return Err(RepoError::Conflict("Email already registered".into()));
            }
            if s.username_taken(&new.username, None) {
                return Err(RepoError::Conflict("Username already taken".into()));
            }
            let id = s.next_id();
            let user = User {
                id,
                username: new.username,
                email,
                password_hash: new.password_hash,
                role: Role::User,
                is_verified: new.is_verified,
                is_banned: false,
                auth_provider: new.auth_provider,
                oauth_id: new.oauth_id,
                bio: None,
                avatar_url: new.avatar_url,
                email_notifications: true,
                verification_token_hash: None,
                verification_expires_at: None,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            Ok(user)
        })
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.view(|s| s.users.get(&id).cloned().ok_or(RepoError::NotFound))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let email = email.to_lowercase();
        self.view(|s| Ok(s.users.values().find(|u| u.email == email).cloned()))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.view(|s| {
            Ok(s.users.values().find(|u| u.username.eq_ignore_ascii_case(username)).cloned())
        })
    }

    async fn find_user_by_verification(&self, token_hash: &str) -> RepoResult<Option<User>> {
        self.view(|s| {
            Ok(s.users
                .values()
                .find(|u| u.verification_token_hash.as_deref() == Some(token_hash))
                .cloned())
        })
    }

    async fn set_verification(
        &self,
        id: Id,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.mutate(|s| {
            let user = s.user_mut(id)?;
            user.verification_token_hash = Some(token_hash.to_string());
            user.verification_expires_at = Some(expires_at);
            Ok(())
        })
    }

    async fn mark_verified(&self, id: Id) -> RepoResult<User> {
        self.mutate(|s| {
            let user = s.user_mut(id)?;
            user.is_verified = true;
            user.verification_token_hash = None;
            user.verification_expires_at = None;
            Ok(user.clone())
        })
    }

    async fn link_oauth(&self, id: Id, provider_id: &str) -> RepoResult<User> {
        self.mutate(|s| {
            let user = s.user_mut(id)?;
            user.oauth_id = Some(provider_id.to_string());
            user.is_verified = true;
            user.verification_token_hash = None;
            user.verification_expires_at = None;
            Ok(user.clone())
        })
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        self.mutate(|s| {
            if let Some(ref name) = upd.username {
                if s.username_taken(name, Some(id)) {
                    return Err(RepoError::Conflict("Username already taken".into()));
                }
            }
            let user = s.user_mut(id)?;
            if let Some(name) = upd.username {
                user.username = name;
            }
            if let Some(bio) = upd.bio {
                user.bio = Some(bio).filter(|b| !b.is_empty());
            }
            if let Some(url) = upd.avatar_url {
                user.avatar_url = Some(url).filter(|u| !u.is_empty());
            }
            if let Some(flag) = upd.email_notifications {
                user.email_notifications = flag;
            }
            Ok(user.clone())
        })
    }

    async fn set_banned(&self, id: Id, banned: bool) -> RepoResult<User> {
        self.mutate(|s| {
            let user = s.user_mut(id)?;
            user.is_banned = banned;
            Ok(user.clone())
        })
    }

    async fn set_role(&self, id: Id, role: Role) -> RepoResult<User> {
        self.mutate(|s| {
            let user = s.user_mut(id)?;
            user.role = role;
            Ok(user.clone())
        })
    }
}

#[async_trait]
impl EpisodeRepo for InMemRepo {
    async fn list_episodes(&self) -> RepoResult<Vec<Episode>> {
        self.view(|s| {
            let mut v: Vec<_> = s.episodes.values().cloned().collect();
            v.sort_by_key(|e| e.episode_number);
            Ok(v)
        })
    }

    async fn get_episode(&self, id: Id) -> RepoResult<Episode> {
        self.view(|s| s.episodes.get(&id).cloned().ok_or(RepoError::NotFound))
    }

    async fn find_episode_by_slug(&self, slug: &str) -> RepoResult<Option<Episode>> {
        self.view(|s| Ok(s.episodes.values().find(|e| e.slug == slug).cloned()))
    }

    async fn upsert_episode(&self, new: NewEpisode) -> RepoResult<Episode> {
        self.mutate(|s| {
            let existing = s.episodes.values().find(|e| e.slug == new.slug).map(|e| e.id);
            let id = match existing {
                Some(id) => id,
                None => s.next_id(),
            };
            let episode = Episode {
                id,
                slug: new.slug,
                title: new.title,
                episode_number: new.episode_number,
                description: new.description,
                tags: new.tags,
                published_at: new.published_at,
            };
            s.episodes.insert(id, episode.clone());
            Ok(episode)
        })
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        self.mutate(|s| {
            if let Some(ep) = new.episode_id {
                if !s.episodes.contains_key(&ep) {
                    return Err(RepoError::NotFound);
                }
            }
            let now = Utc::now();
            let id = s.next_id();
            let post = Post {
                id,
                user_id: new.user_id,
                episode_id: new.episode_id,
                title: new.title,
                content: new.content,
                post_type: PostType::for_episode(new.episode_id),
                likes: 0,
                liked_by: Vec::new(),
                comment_count: 0,
                views: 0,
                is_moderated: false,
                created_at: now,
                updated_at: now,
                last_activity_at: now,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        })
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        self.view(|s| s.posts.get(&id).cloned().ok_or(RepoError::NotFound))
    }

    async fn list_posts(&self, q: &PostQuery) -> RepoResult<PostPage> {
        self.view(|s| {
            let mut v: Vec<&Post> = s
                .posts
                .values()
                .filter(|p| q.include_moderated || !p.is_moderated)
                .filter(|p| q.post_type.map_or(true, |t| p.post_type == t))
                .filter(|p| q.episode_id.map_or(true, |e| p.episode_id == Some(e)))
                .filter(|p| q.user_id.map_or(true, |u| p.user_id == u))
                .collect();
            match q.sort {
                SortMode::Activity => v.sort_by(|a, b| {
                    b.last_activity_at.cmp(&a.last_activity_at).then(b.id.cmp(&a.id))
                }),
                SortMode::Popular => v.sort_by(|a, b| {
                    b.likes
                        .cmp(&a.likes)
                        .then(b.comment_count.cmp(&a.comment_count))
                        .then(b.created_at.cmp(&a.created_at))
                        .then(b.id.cmp(&a.id))
                }),
                SortMode::Newest => {
                    v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
                }
            }
            let total = v.len() as u64;
            let posts = v
                .into_iter()
                .skip(q.offset())
                .take(q.limit as usize)
                .cloned()
                .collect();
            Ok(PostPage { posts, total })
        })
    }

    async fn update_post(
        &self,
        id: Id,
        title: Option<String>,
        content: Option<String>,
    ) -> RepoResult<Post> {
        self.mutate(|s| {
            let post = s.post_mut(id)?;
            if let Some(t) = title { post.title = t; }
            if let Some(c) = content { post.content = c; }
            post.updated_at = Utc::now();
            Ok(post.clone())
        })
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            s.comments.retain(|_, c| c.post_id != id);
            Ok(())
        })
    }

    async fn toggle_post_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        self.mutate(|s| {
            let post = s.post_mut(id)?;
            Ok(toggle(&mut post.liked_by, &mut post.likes, user_id))
        })
    }

    async fn increment_views(&self, id: Id) -> RepoResult<()> {
        self.mutate(|s| {
            s.post_mut(id)?.views += 1;
            Ok(())
        })
    }

    async fn set_post_moderated(&self, id: Id, moderated: bool) -> RepoResult<Post> {
        self.mutate(|s| {
            let post = s.post_mut(id)?;
            post.is_moderated = moderated;
            Ok(post.clone())
        })
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        self.mutate(|s| {
            if !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::NotFound);
            }
            if let Some(parent) = new.parent_comment_id {
                match s.comments.get(&parent) {
                    Some(c) if c.post_id == new.post_id => {}
                    _ => return Err(RepoError::NotFound),
                }
            }
            let now = Utc::now();
            let id = s.next_id();
            let comment = Comment {
                id,
                post_id: new.post_id,
                user_id: new.user_id,
                content: new.content,
                parent_comment_id: new.parent_comment_id,
                likes: 0,
                liked_by: Vec::new(),
                is_moderated: false,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            let post = s.post_mut(new.post_id)?;
            post.comment_count += 1;
            post.last_activity_at = now;
            Ok(comment)
        })
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.view(|s| s.comments.get(&id).cloned().ok_or(RepoError::NotFound))
    }

    async fn list_comments(
        &self,
        post_id: Id,
        parent: Option<Id>,
        include_moderated: bool,
    ) -> RepoResult<Vec<Comment>> {
        self.view(|s| {
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id && c.parent_comment_id == parent)
                .filter(|c| include_moderated || !c.is_moderated)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        })
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<u64> {
        self.mutate(|s| {
            let comment = s.comments.remove(&id).ok_or(RepoError::NotFound)?;
            let before = s.comments.len();
            s.comments.retain(|_, c| c.parent_comment_id != Some(id));
            let removed = 1 + (before - s.comments.len()) as u64;
            if let Some(post) = s.posts.get_mut(&comment.post_id) {
                post.comment_count = (post.comment_count - removed as i64).max(0);
            }
            Ok(removed)
        })
    }

    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
        self.mutate(|s| {
            let comment = s.comment_mut(id)?;
            comment.content = content;
            comment.updated_at = Utc::now();
            Ok(comment.clone())
        })
    }

    async fn toggle_comment_like(&self, id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        self.mutate(|s| {
            let comment = s.comment_mut(id)?;
            Ok(toggle(&mut comment.liked_by, &mut comment.likes, user_id))
        })
    }

    async fn set_comment_moderated(&self, id: Id, moderated: bool) -> RepoResult<Comment> {
        self.mutate(|s| {
            let comment = s.comment_mut(id)?;
            comment.is_moderated = moderated;
            Ok(comment.clone())
        })
    }
}

#[async_trait]
impl NotificationRepo for InMemRepo {
    async fn create_notification(&self, new: NewNotification) -> RepoResult<Notification> {
        self.mutate(|s| {
            let id = s.next_id();
            let n = Notification {
                id,
                user_id: new.user_id,
                actor_id: new.actor_id,
                actor_username: new.actor_username,
                kind: new.kind,
                post_id: new.post_id,
                comment_id: new.comment_id,
                message: new.message,
                is_read: false,
                created_at: Utc::now(),
            };
            s.notifications.insert(id, n.clone());
            Ok(n)
        })
    }

    async fn list_notifications(
        &self,
        user_id: Id,
        q: &NotificationQuery,
    ) -> RepoResult<Vec<Notification>> {
        self.view(|s| {
            let mut v: Vec<_> = s
                .notifications
                .values()
                .filter(|n| n.user_id == user_id)
                .filter(|n| !q.unread_only || !n.is_read)
                .filter(|n| q.since.map_or(true, |t| n.created_at > t))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            v.truncate(q.limit);
            Ok(v)
        })
    }

    async fn count_unread(&self, user_id: Id) -> RepoResult<u64> {
        self.view(|s| {
            let unread = s.notifications.values().filter(|n| n.user_id == user_id && !n.is_read);
            Ok(unread.count() as u64)
        })
    }

    async fn mark_read(&self, user_id: Id, id: Id) -> RepoResult<Notification> {
        self.mutate(|s| match s.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id => {
                n.is_read = true;
                Ok(n.clone())
            }
            _ => Err(RepoError::NotFound),
        })
    }

    async fn mark_all_read(&self, user_id: Id) -> RepoResult<u64> {
        self.mutate(|s| {
            let mut changed = 0;
            for n in s.notifications.values_mut().filter(|n| n.user_id == user_id && !n.is_read) {
                n.is_read = true;
                changed += 1;
            }
            Ok(changed)
        })
    }
}

#[async_trait]
impl ModerationLogRepo for InMemRepo {
    async fn log_moderation(&self, new: NewModerationLog) -> RepoResult<ModerationLog> {
        self.mutate(|s| {
            let id = s.next_id();
            let log = ModerationLog {
                id,
                user_id: new.user_id,
                content_type: new.content_type,
                excerpt: new.excerpt,
                reason: new.reason,
                flagged_words: new.flagged_words,
                created_at: Utc::now(),
            };
            s.moderation_logs.insert(id, log.clone());
            Ok(log)
        })
    }

    async fn list_moderation_logs(&self, limit: usize) -> RepoResult<Vec<ModerationLog>> {
        self.view(|s| {
            let mut v: Vec<_> = s.moderation_logs.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            v.truncate(limit);
            Ok(v)
        })
    }
}

#[async_trait]
impl ContactRepo for InMemRepo {
    async fn create_contact(&self, new: NewContact) -> RepoResult<ContactForm> {
        self.mutate(|s| {
            let id = s.next_id();
            let form = ContactForm {
                id,
                name: new.name,
                email: new.email,
                organization: new.organization,
                message: new.message,
                intent: new.intent,
                is_read: false,
                is_replied: false,
                reply_message: None,
                replied_at: None,
                created_at: Utc::now(),
            };
            s.contacts.insert(id, form.clone());
            Ok(form)
        })
    }

    async fn mirror_contact(&self, form: &ContactForm) -> RepoResult<()> {
        self.mutate(|s| {
            s.next_id = s.next_id.max(form.id);
            s.contacts.insert(form.id, form.clone());
            Ok(())
        })
    }

    async fn list_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<ContactForm>> {
        self.view(|s| {
            let mut v: Vec<_> = s
                .contacts
                .values()
                .filter(|c| filter.intent.map_or(true, |i| c.intent == i))
                .filter(|c| !filter.unread_only || !c.is_read)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        })
    }

    async fn get_contact(&self, id: Id) -> RepoResult<ContactForm> {
        self.view(|s| s.contacts.get(&id).cloned().ok_or(RepoError::NotFound))
    }

    async fn update_contact(&self, id: Id, upd: ContactUpdate) -> RepoResult<ContactForm> {
        self.mutate(|s| {
            let form = s.contacts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(read) = upd.is_read { form.is_read = read; }
            if let Some(replied) = upd.is_replied { form.is_replied = replied; }
            if let Some(msg) = upd.reply_message {
                form.reply_message = Some(msg);
                form.is_replied = true;
                form.replied_at = Some(Utc::now());
            }
            Ok(form.clone())
        })
    }
}

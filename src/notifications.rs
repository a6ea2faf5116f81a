//! In-app notifications plus their optional email twin.

use std::sync::Arc;

use tracing::warn;

use crate::mailer::{self, Email, Mailer};
use crate::models::*;
use crate::repo::Repo;
use crate::templates;

/// Something a member did that other members may hear about.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Commented { post: &'a Post, comment: &'a Comment },
    Replied { post: &'a Post, parent: &'a Comment, reply: &'a Comment },
    PostLiked { post: &'a Post },
    CommentLiked { post: &'a Post, comment: &'a Comment },
}

struct Target {
    user_id: Id,
    kind: NotificationKind,
    comment_id: Option<Id>,
}

impl Event<'_> {
    fn post(&self) -> &Post {
        match self {
            Event::Commented { post, .. }
            | Event::Replied { post, .. }
            | Event::PostLiked { post }
            | Event::CommentLiked { post, .. } => post,
        }
    }

    fn targets(&self) -> Vec<Target> {
        match *self {
            Event::Commented { post, comment } => vec![Target {
                user_id: post.user_id,
                kind: NotificationKind::Comment,
                comment_id: Some(comment.id),
            }],
            Event::Replied { post, parent, reply } => {
                let mut t = vec![Target {
                    user_id: parent.user_id,
                    kind: NotificationKind::Reply,
                    comment_id: Some(reply.id),
                }];
                if post.user_id != parent.user_id {
                    t.push(Target {
                        user_id: post.user_id,
                        kind: NotificationKind::Comment,
                        comment_id: Some(reply.id),
                    });
                }
                t
            }
            Event::PostLiked { post } => vec![Target {
                user_id: post.user_id,
                kind: NotificationKind::PostLike,
                comment_id: None,
            }],
            Event::CommentLiked { comment, .. } => vec![Target {
                user_id: comment.user_id,
                kind: NotificationKind::CommentLike,
                comment_id: Some(comment.id),
            }],
        }
    }

    fn body(&self) -> &str {
        match self {
            Event::Commented { comment, .. } => comment.content.as_str(),
            Event::Replied { reply, .. } => reply.content.as_str(),
            _ => "",
        }
    }
}

fn message(kind: NotificationKind, actor: &str, post_title: &str) -> String {
    match kind {
        NotificationKind::Comment => format!("{actor} commented on \"{post_title}\""),
        NotificationKind::Reply => format!("{actor} replied to your comment on \"{post_title}\""),
        NotificationKind::PostLike => format!("{actor} liked your post \"{post_title}\""),
        NotificationKind::CommentLike => format!("{actor} liked your comment on \"{post_title}\""),
    }
}

pub fn post_link(frontend_url: &str, post_id: Id) -> String {
    format!("{}/xxperiment/posts/{post_id}", frontend_url.trim_end_matches('/'))
}

fn email_for(
    kind: NotificationKind,
    to: &str,
    actor: &str,
    post: &Post,
    body: &str,
    link: &str,
) -> Email {
    let title = &post.title;
    match kind {
        NotificationKind::Comment => templates::new_comment(to, actor, title, body, link),
        NotificationKind::Reply => templates::new_reply(to, actor, title, body, link),
        NotificationKind::PostLike => templates::new_like(to, actor, "post", title, link),
        NotificationKind::CommentLike => templates::new_like(to, actor, "comment", title, link),
    }
}

/// Records a notification for everyone the event concerns except the actor,
/// and fires an email to those who opted in. Failures are logged, never
/// returned: the action that caused the event has already succeeded.
pub async fn notify(
    repo: &dyn Repo,
    mailer: &Arc<dyn Mailer>,
    frontend_url: &str,
    actor: &User,
    event: Event<'_>,
) -> usize {
    let post = event.post();
    let link = post_link(frontend_url, post.id);
    let mut sent = 0;
    for target in event.targets() {
        if target.user_id == actor.id {
            continue;
        }
        let new = NewNotification {
            user_id: target.user_id,
            actor_id: actor.id,
            actor_username: actor.username.clone(),
            kind: target.kind,
            post_id: post.id,
            comment_id: target.comment_id,
            message: message(target.kind, &actor.username, &post.title),
        };
        if let Err(e) = repo.create_notification(new).await {
            warn!(recipient = target.user_id, "notification insert failed: {e}");
            continue;
        }
        sent += 1;
        match repo.get_user(target.user_id).await {
            Ok(recipient) if recipient.email_notifications => {
                let email = email_for(
                    target.kind,
                    &recipient.email,
                    &actor.username,
                    post,
                    event.body(),
                    &link,
                );
                mailer::dispatch(mailer.clone(), email);
            }
            Ok(_) => {}
            Err(e) => warn!(recipient = target.user_id, "recipient lookup failed: {e}"),
        }
    }
    sent
}

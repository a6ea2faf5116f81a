use crate::auth::Role;
use crate::models::{
    AuthProvider, AuthorSummary, Comment, ContactForm, ContactUpdate, ContentType, Episode,
    EpisodeSummary, Intent, LikeToggle, ModerationLog, NewContact, Notification, NotificationKind,
    Post, PostType, PublicProfile, SortMode, UpdateProfile, UserView,
};
use crate::routes::{auth, contact, forum, notifications, HealthResponse, MessageResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Medicoz Infosystems API",
        description = "Marketing site backend, The XXperiment forum and contact triage"
    ),
    paths(
        crate::routes::health,
        auth::signup,
        auth::login,
        auth::logout,
        auth::me,
        auth::update_profile,
        auth::verify_email,
        auth::resend_verification,
        auth::google_login,
        auth::google_callback,
        forum::list_posts,
        forum::create_post,
        forum::get_post,
        forum::update_post,
        forum::delete_post,
        forum::like_post,
        forum::moderate_post,
        forum::create_comment,
        forum::update_comment,
        forum::delete_comment,
        forum::like_comment,
        forum::moderate_comment,
        forum::list_episodes,
        forum::get_episode,
        forum::get_profile,
        forum::moderation_logs,
        forum::ban_user,
        forum::set_role,
        notifications::list,
        notifications::unread_count,
        notifications::read_one,
        notifications::read_all,
        contact::submit,
        contact::list,
        contact::get_one,
        contact::update,
        contact::reply,
    ),
    components(schemas(
        Role, AuthProvider, UserView, PublicProfile, UpdateProfile, AuthorSummary,
        Episode, EpisodeSummary, Post, PostType, SortMode, Comment, LikeToggle,
        Notification, NotificationKind, ModerationLog, ContentType,
        ContactForm, NewContact, ContactUpdate, Intent,
        HealthResponse, MessageResponse,
        auth::SignupRequest, auth::LoginRequest, auth::VerifyEmailRequest, auth::AuthResponse,
        forum::PostView, forum::PostListResponse, forum::Pagination, forum::CommentView,
        forum::ThreadComment, forum::PostDetail, forum::CreatePostRequest, forum::UpdatePostRequest,
        forum::CreateCommentRequest, forum::UpdateCommentRequest, forum::ModerateRequest,
        forum::BanRequest, forum::RoleRequest,
        notifications::NotificationList, notifications::UnreadCount, notifications::ReadAllResponse,
        contact::SubmitResponse, contact::ReplyRequest,
        crate::moderation::ModerationResult,
    )),
    tags(
        (name = "auth", description = "Accounts and sessions"),
        (name = "forum", description = "The XXperiment posts, comments and moderation"),
        (name = "notifications", description = "In-app notifications"),
        (name = "contact", description = "Contact intake and admin triage"),
    )
)]
pub struct ApiDoc;

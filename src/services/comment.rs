//! Comment service
//!
//! Business logic for comments: guest and member commenting, the
//! moderation queue, threaded retrieval and like/dislike voting.

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CommentThread, CreateCommentInput, User, VoterIdentity};
use anyhow::{Context, Result};
use std::sync::Arc;

use super::settings::SettingsService;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    /// Comment not found
    #[error("Comment not found: {0}")]
    NotFound(String),

    /// Post not found or not visible
    #[error("Post not found: {0}")]
    PostNotFound(String),

    /// Comments are disabled on this post
    #[error("Comments are closed")]
    CommentsClosed,

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The actor may not perform this operation
    #[error("Permission denied")]
    PermissionDenied,

    /// The request carries no usable voter identity
    #[error("Cannot identify the voter")]
    UnidentifiedVoter,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Comment service
pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
    settings: Arc<SettingsService>,
}

impl CommentService {
    /// Create a new comment service
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        post_repo: Arc<dyn PostRepository>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            settings,
        }
    }

    /// Post a comment, as a member when `author` is set, as a guest
    /// otherwise. Guests must supply a display name.
    ///
    /// Whether the comment starts out approved follows the
    /// `comments_require_approval` setting; admin comments are always
    /// approved.
    pub async fn create(
        &self,
        input: CreateCommentInput,
        author: Option<&User>,
        ip_address: Option<&str>,
    ) -> Result<Comment, CommentServiceError> {
        if input.content.trim().is_empty() {
            return Err(CommentServiceError::ValidationError(
                "Comment content cannot be empty".to_string(),
            ));
        }
        if author.is_none()
            && input
                .guest_name
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(CommentServiceError::ValidationError(
                "Guest comments need a display name".to_string(),
            ));
        }

        let post = self
            .post_repo
            .get_by_id(input.post_id)
            .await
            .context("Failed to load post")?
            .ok_or_else(|| CommentServiceError::PostNotFound(format!("id {}", input.post_id)))?;
        if !post.is_published {
            return Err(CommentServiceError::PostNotFound(format!(
                "id {}",
                input.post_id
            )));
        }
        if !post.allow_comments {
            return Err(CommentServiceError::CommentsClosed);
        }

        if let Some(parent_id) = input.parent_id {
            let parent = self
                .repo
                .get_by_id(parent_id)
                .await
                .context("Failed to load parent comment")?
                .ok_or_else(|| {
                    CommentServiceError::ValidationError(format!(
                        "Parent comment {} does not exist",
                        parent_id
                    ))
                })?;
            if parent.post_id != input.post_id {
                return Err(CommentServiceError::ValidationError(
                    "Parent comment belongs to another post".to_string(),
                ));
            }
        }

        let require_approval = self
            .settings
            .comments_require_approval()
            .await
            .context("Failed to read approval setting")?;
        let is_approved = author.map(|u| u.is_admin()).unwrap_or(false) || !require_approval;

        self.repo
            .create(&input, author.map(|u| u.id), ip_address, is_approved)
            .await
            .context("Failed to create comment")
            .map_err(Into::into)
    }

    /// Get a post's comment threads, pinned first then newest. Top-level
    /// comments are paginated; replies ride along in full, oldest first.
    /// Unapproved comments are only included for moderators.
    pub async fn get_by_post(
        &self,
        post_id: i64,
        page: i64,
        per_page: i64,
        include_unapproved: bool,
    ) -> Result<(Vec<CommentThread>, i64), CommentServiceError> {
        self.repo
            .list_by_post(post_id, page, per_page, !include_unapproved)
            .await
            .context("Failed to list comments")
            .map_err(Into::into)
    }

    /// Like, dislike or retract a vote on a comment. `vote` is +1, -1 or
    /// 0 to retract. Voting the same way twice is a no-op; voting the
    /// other way flips both tallies. Returns the new
    /// (likes_count, dislikes_count) pair.
    pub async fn vote(
        &self,
        comment_id: i64,
        user_id: Option<i64>,
        ip_address: Option<&str>,
        vote: i32,
    ) -> Result<(i64, i64), CommentServiceError> {
        if !matches!(vote, -1 | 0 | 1) {
            return Err(CommentServiceError::ValidationError(
                "Vote must be -1, 0 or 1".to_string(),
            ));
        }
        let voter = VoterIdentity::resolve(user_id, ip_address)
            .ok_or(CommentServiceError::UnidentifiedVoter)?;

        self.repo
            .vote(comment_id, &voter, vote)
            .await
            .context("Failed to vote on comment")?
            .ok_or_else(|| CommentServiceError::NotFound(format!("id {}", comment_id)))
    }

    /// Approve or unapprove a comment
    pub async fn set_approved(
        &self,
        id: i64,
        approved: bool,
    ) -> Result<(), CommentServiceError> {
        let found = self
            .repo
            .set_approved(id, approved)
            .await
            .context("Failed to set approval")?;
        if !found {
            return Err(CommentServiceError::NotFound(format!("id {}", id)));
        }
        Ok(())
    }

    /// Pin or unpin a comment within its thread. Only approved comments
    /// can be pinned.
    pub async fn set_pinned(&self, id: i64, pinned: bool) -> Result<(), CommentServiceError> {
        let comment = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load comment")?
            .ok_or_else(|| CommentServiceError::NotFound(format!("id {}", id)))?;

        if pinned && !comment.is_approved {
            return Err(CommentServiceError::ValidationError(
                "Only approved comments can be pinned".to_string(),
            ));
        }

        self.repo
            .set_pinned(id, pinned)
            .await
            .context("Failed to set pinned")?;
        Ok(())
    }

    /// Delete a comment and its replies. Admins can delete any comment,
    /// members only their own.
    pub async fn delete(&self, id: i64, actor: &User) -> Result<(), CommentServiceError> {
        let comment = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load comment")?
            .ok_or_else(|| CommentServiceError::NotFound(format!("id {}", id)))?;

        if !actor.is_admin() && comment.author_id != Some(actor.id) {
            return Err(CommentServiceError::PermissionDenied);
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete comment")?;
        Ok(())
    }

    /// List comments awaiting moderation, oldest first
    pub async fn list_pending(
        &self,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Comment>, i64), CommentServiceError> {
        let items = self
            .repo
            .list_pending(page, per_page)
            .await
            .context("Failed to list pending comments")?;
        let total = self
            .repo
            .count_pending()
            .await
            .context("Failed to count pending comments")?;
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository, SqlxSessionRepository,
        SqlxSettingsRepository, SqlxTagRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreatePostInput, CreateUserInput};
    use crate::services::post::PostService;
    use crate::services::settings::keys;
    use crate::services::tag::TagService;
    use crate::services::user::UserService;
    use futures::future::join_all;
    use sqlx::SqlitePool;

    struct TestContext {
        _pool: SqlitePool,
        service: CommentService,
        settings: Arc<SettingsService>,
        posts: PostService,
        admin: User,
        member: User,
        post_id: i64,
    }

    async fn setup() -> TestContext {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        let admin = users
            .register(CreateUserInput {
                username: "admin".to_string(),
                email: "admin@example.com".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();
        let member = users
            .register(CreateUserInput {
                username: "member".to_string(),
                email: "member@example.com".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();

        let settings = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
        ));
        let posts = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone()))),
        );
        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            settings.clone(),
        );

        let post = posts
            .create(
                CreatePostInput {
                    title: "Discussed".to_string(),
                    excerpt: None,
                    content: "Content".to_string(),
                    is_published: true,
                    is_featured: false,
                    is_pinned: false,
                    allow_comments: true,
                    category_ids: vec![],
                    tags: vec![],
                },
                &admin,
            )
            .await
            .unwrap();

        TestContext {
            _pool: pool,
            service,
            settings,
            posts,
            admin,
            member,
            post_id: post.post.id,
        }
    }

    fn comment_input(post_id: i64, content: &str) -> CreateCommentInput {
        CreateCommentInput {
            post_id,
            parent_id: None,
            guest_name: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_guest_comment_needs_name() {
        let ctx = setup().await;

        let result = ctx
            .service
            .create(comment_input(ctx.post_id, "hi"), None, Some("10.0.0.1"))
            .await;
        assert!(matches!(
            result,
            Err(CommentServiceError::ValidationError(_))
        ));

        let mut input = comment_input(ctx.post_id, "hi");
        input.guest_name = Some("Visitor".to_string());
        let comment = ctx.service.create(input, None, Some("10.0.0.1")).await.unwrap();
        assert_eq!(comment.guest_name.as_deref(), Some("Visitor"));
        assert!(comment.author_id.is_none());
    }

    #[tokio::test]
    async fn test_comment_bumps_post_counter() {
        let ctx = setup().await;

        ctx.service
            .create(comment_input(ctx.post_id, "first"), Some(&ctx.member), None)
            .await
            .unwrap();
        ctx.service
            .create(comment_input(ctx.post_id, "second"), Some(&ctx.member), None)
            .await
            .unwrap();

        let post = ctx.posts.get_by_id(ctx.post_id).await.unwrap().unwrap();
        assert_eq!(post.post.comments_count, 2);
    }

    #[tokio::test]
    async fn test_closed_comments_rejected() {
        let ctx = setup().await;

        let closed = ctx
            .posts
            .create(
                CreatePostInput {
                    title: "Closed".to_string(),
                    excerpt: None,
                    content: "Content".to_string(),
                    is_published: true,
                    is_featured: false,
                    is_pinned: false,
                    allow_comments: false,
                    category_ids: vec![],
                    tags: vec![],
                },
                &ctx.admin,
            )
            .await
            .unwrap();

        let result = ctx
            .service
            .create(comment_input(closed.post.id, "hi"), Some(&ctx.member), None)
            .await;
        assert!(matches!(result, Err(CommentServiceError::CommentsClosed)));
    }

    #[tokio::test]
    async fn test_reply_must_match_post() {
        let ctx = setup().await;

        let other = ctx
            .posts
            .create(
                CreatePostInput {
                    title: "Other".to_string(),
                    excerpt: None,
                    content: "Content".to_string(),
                    is_published: true,
                    is_featured: false,
                    is_pinned: false,
                    allow_comments: true,
                    category_ids: vec![],
                    tags: vec![],
                },
                &ctx.admin,
            )
            .await
            .unwrap();

        let parent = ctx
            .service
            .create(comment_input(ctx.post_id, "parent"), Some(&ctx.member), None)
            .await
            .unwrap();

        let mut input = comment_input(other.post.id, "stray reply");
        input.parent_id = Some(parent.id);
        let result = ctx.service.create(input, Some(&ctx.member), None).await;
        assert!(matches!(
            result,
            Err(CommentServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_moderation_queue_and_approval() {
        let ctx = setup().await;
        ctx.settings
            .set(keys::COMMENTS_REQUIRE_APPROVAL, "true")
            .await
            .unwrap();

        let held = ctx
            .service
            .create(comment_input(ctx.post_id, "held"), Some(&ctx.member), None)
            .await
            .unwrap();
        assert!(!held.is_approved);

        // Admin comments skip the queue
        let admin_comment = ctx
            .service
            .create(comment_input(ctx.post_id, "mod voice"), Some(&ctx.admin), None)
            .await
            .unwrap();
        assert!(admin_comment.is_approved);

        let (pending, total) = ctx.service.list_pending(1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(pending[0].id, held.id);

        let post = ctx.posts.get_by_id(ctx.post_id).await.unwrap().unwrap();
        assert_eq!(post.post.comments_count, 1);

        ctx.service.set_approved(held.id, true).await.unwrap();
        let post = ctx.posts.get_by_id(ctx.post_id).await.unwrap().unwrap();
        assert_eq!(post.post.comments_count, 2);
    }

    #[tokio::test]
    async fn test_pinning_requires_approval() {
        let ctx = setup().await;
        ctx.settings
            .set(keys::COMMENTS_REQUIRE_APPROVAL, "true")
            .await
            .unwrap();

        let held = ctx
            .service
            .create(comment_input(ctx.post_id, "held"), Some(&ctx.member), None)
            .await
            .unwrap();
        assert!(!held.is_approved);

        let result = ctx.service.set_pinned(held.id, true).await;
        assert!(matches!(
            result,
            Err(CommentServiceError::ValidationError(_))
        ));

        // Approval unlocks pinning
        ctx.service.set_approved(held.id, true).await.unwrap();
        ctx.service.set_pinned(held.id, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_threads_paginate_pinned_first() {
        let ctx = setup().await;

        let mut pinned_ids = Vec::new();
        for i in 0..3 {
            let c = ctx
                .service
                .create(
                    comment_input(ctx.post_id, &format!("pinned {}", i)),
                    Some(&ctx.member),
                    None,
                )
                .await
                .unwrap();
            ctx.service.set_pinned(c.id, true).await.unwrap();
            pinned_ids.push(c.id);
        }
        for i in 0..5 {
            ctx.service
                .create(
                    comment_input(ctx.post_id, &format!("plain {}", i)),
                    Some(&ctx.member),
                    None,
                )
                .await
                .unwrap();
        }
        // Unapproved comments stay out of the reader view
        ctx.settings
            .set(keys::COMMENTS_REQUIRE_APPROVAL, "true")
            .await
            .unwrap();
        for i in 0..2 {
            ctx.service
                .create(
                    comment_input(ctx.post_id, &format!("held {}", i)),
                    Some(&ctx.member),
                    None,
                )
                .await
                .unwrap();
        }

        let (threads, total) = ctx.service.get_by_post(ctx.post_id, 1, 4, false).await.unwrap();
        assert_eq!(total, 8);
        assert_eq!(threads.len(), 4);
        let page_ids: Vec<i64> = threads.iter().map(|t| t.comment.id).collect();
        for id in &pinned_ids {
            assert!(page_ids.contains(id));
        }
        assert!(threads[..3].iter().all(|t| t.comment.is_pinned));

        let (threads, _) = ctx.service.get_by_post(ctx.post_id, 2, 4, false).await.unwrap();
        assert_eq!(threads.len(), 4);

        let (_, total_with_held) = ctx.service.get_by_post(ctx.post_id, 1, 4, true).await.unwrap();
        assert_eq!(total_with_held, 10);
    }

    #[tokio::test]
    async fn test_replies_ride_along_oldest_first() {
        let ctx = setup().await;

        let parent = ctx
            .service
            .create(comment_input(ctx.post_id, "parent"), Some(&ctx.member), None)
            .await
            .unwrap();
        for i in 0..3 {
            let mut input = comment_input(ctx.post_id, &format!("reply {}", i));
            input.parent_id = Some(parent.id);
            ctx.service.create(input, Some(&ctx.member), None).await.unwrap();
        }

        let (threads, total) = ctx.service.get_by_post(ctx.post_id, 1, 20, false).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(threads[0].replies.len(), 3);
        assert_eq!(threads[0].replies[0].content, "reply 0");
        assert_eq!(threads[0].replies[2].content, "reply 2");
    }

    #[tokio::test]
    async fn test_vote_state_machine() {
        let ctx = setup().await;
        let comment = ctx
            .service
            .create(comment_input(ctx.post_id, "voted"), Some(&ctx.member), None)
            .await
            .unwrap();
        let id = comment.id;
        let voter = Some(ctx.admin.id);

        // Like, then like again: second one is a no-op
        assert_eq!(ctx.service.vote(id, voter, None, 1).await.unwrap(), (1, 0));
        assert_eq!(ctx.service.vote(id, voter, None, 1).await.unwrap(), (1, 0));

        // Flip to dislike adjusts both tallies
        assert_eq!(ctx.service.vote(id, voter, None, -1).await.unwrap(), (0, 1));

        // Retract clears the row
        assert_eq!(ctx.service.vote(id, voter, None, 0).await.unwrap(), (0, 0));

        // Retracting with no standing vote changes nothing
        assert_eq!(ctx.service.vote(id, voter, None, 0).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_vote_identities_are_separate() {
        let ctx = setup().await;
        let comment = ctx
            .service
            .create(comment_input(ctx.post_id, "contested"), Some(&ctx.member), None)
            .await
            .unwrap();

        ctx.service.vote(comment.id, Some(ctx.admin.id), None, 1).await.unwrap();
        ctx.service.vote(comment.id, None, Some("10.0.0.1"), 1).await.unwrap();
        let (likes, dislikes) = ctx
            .service
            .vote(comment.id, None, Some("10.0.0.2"), -1)
            .await
            .unwrap();

        assert_eq!((likes, dislikes), (2, 1));
    }

    #[tokio::test]
    async fn test_vote_validation() {
        let ctx = setup().await;
        let comment = ctx
            .service
            .create(comment_input(ctx.post_id, "strict"), Some(&ctx.member), None)
            .await
            .unwrap();

        let result = ctx.service.vote(comment.id, Some(ctx.admin.id), None, 2).await;
        assert!(matches!(
            result,
            Err(CommentServiceError::ValidationError(_))
        ));

        let result = ctx.service.vote(comment.id, None, None, 1).await;
        assert!(matches!(result, Err(CommentServiceError::UnidentifiedVoter)));

        let result = ctx.service.vote(9999, Some(ctx.admin.id), None, 1).await;
        assert!(matches!(result, Err(CommentServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_votes_all_counted() {
        let ctx = setup().await;
        let comment = ctx
            .service
            .create(comment_input(ctx.post_id, "stampede"), Some(&ctx.member), None)
            .await
            .unwrap();

        let votes = (0..50).map(|i| {
            let ip = format!("10.0.1.{}", i);
            let service = &ctx.service;
            let id = comment.id;
            async move { service.vote(id, None, Some(&ip), 1).await }
        });
        let results = join_all(votes).await;
        for result in results {
            result.unwrap();
        }

        let reloaded = ctx.service.repo.get_by_id(comment.id).await.unwrap().unwrap();
        assert_eq!(reloaded.likes_count, 50);
    }

    #[tokio::test]
    async fn test_delete_recomputes_counter() {
        let ctx = setup().await;

        let parent = ctx
            .service
            .create(comment_input(ctx.post_id, "parent"), Some(&ctx.member), None)
            .await
            .unwrap();
        for i in 0..2 {
            let mut input = comment_input(ctx.post_id, &format!("reply {}", i));
            input.parent_id = Some(parent.id);
            ctx.service.create(input, Some(&ctx.member), None).await.unwrap();
        }

        let post = ctx.posts.get_by_id(ctx.post_id).await.unwrap().unwrap();
        assert_eq!(post.post.comments_count, 3);

        // Deleting the parent cascades to both replies
        ctx.service.delete(parent.id, &ctx.admin).await.unwrap();
        let post = ctx.posts.get_by_id(ctx.post_id).await.unwrap().unwrap();
        assert_eq!(post.post.comments_count, 0);
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let ctx = setup().await;

        let theirs = ctx
            .service
            .create(comment_input(ctx.post_id, "admin says"), Some(&ctx.admin), None)
            .await
            .unwrap();

        let result = ctx.service.delete(theirs.id, &ctx.member).await;
        assert!(matches!(result, Err(CommentServiceError::PermissionDenied)));

        let mine = ctx
            .service
            .create(comment_input(ctx.post_id, "mine"), Some(&ctx.member), None)
            .await
            .unwrap();
        ctx.service.delete(mine.id, &ctx.member).await.unwrap();
    }
}

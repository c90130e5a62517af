//! Post service
//!
//! Business logic for posts: authoring, publication, the category/tag
//! associations, and the engagement operations (views and ratings).

use crate::db::is_unique_violation;
use crate::db::repositories::{CategoryRepository, PostRepository};
use crate::models::{
    CreatePostInput, PagedResult, Post, PostListParams, PostWithRelations, UpdatePostInput, User,
    VoterIdentity,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use super::slug::{assign_slug, SlugError, MAX_SLUG_ATTEMPTS};
use super::tag::{TagService, TagServiceError};

/// Valid rating range, inclusive
const RATING_MIN: i32 = 1;
const RATING_MAX: i32 = 5;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Post not found
    #[error("Post not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The actor may not perform this operation
    #[error("Permission denied")]
    PermissionDenied,

    /// A referenced category does not exist
    #[error("Category {0} does not exist")]
    InvalidCategory(i64),

    /// The request carries no usable voter identity
    #[error("Cannot identify the voter")]
    UnidentifiedVoter,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SlugError> for PostServiceError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::InvalidName(name) => {
                Self::ValidationError(format!("Cannot derive a slug from '{}'", name))
            }
            SlugError::Conflict(name) => {
                Self::ValidationError(format!("Could not assign a slug for '{}'", name))
            }
            SlugError::InternalError(e) => Self::InternalError(e),
        }
    }
}

impl From<TagServiceError> for PostServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::ValidationError(msg) => Self::ValidationError(msg),
            TagServiceError::NotFound(msg) => Self::ValidationError(msg),
            TagServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Post service
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tags: Arc<TagService>,
}

impl PostService {
    /// Create a new post service
    pub fn new(
        repo: Arc<dyn PostRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tags: Arc<TagService>,
    ) -> Self {
        Self {
            repo,
            category_repo,
            tags,
        }
    }

    /// Create a post authored by `author`
    pub async fn create(
        &self,
        input: CreatePostInput,
        author: &User,
    ) -> Result<PostWithRelations, PostServiceError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Post title cannot be empty".to_string(),
            ));
        }
        if input.content.trim().is_empty() {
            return Err(PostServiceError::ValidationError(
                "Post content cannot be empty".to_string(),
            ));
        }
        for &category_id in &input.category_ids {
            if self
                .category_repo
                .get_by_id(category_id)
                .await
                .context("Failed to check category")?
                .is_none()
            {
                return Err(PostServiceError::InvalidCategory(category_id));
            }
        }

        let published_at = input.is_published.then(Utc::now);

        // A concurrent writer can claim the slug between the availability
        // check and the insert; retry with a fresh scan.
        let mut created = None;
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let repo = self.repo.clone();
            let slug = assign_slug(&title, move |candidate| {
                let repo = repo.clone();
                async move { repo.slug_exists(&candidate, None).await }
            })
            .await?;

            let now = Utc::now();
            let post = Post {
                id: 0,
                title: title.clone(),
                slug,
                excerpt: input.excerpt.clone(),
                content: input.content.clone(),
                author_id: author.id,
                is_published: input.is_published,
                is_featured: input.is_featured,
                is_pinned: input.is_pinned,
                allow_comments: input.allow_comments,
                published_at,
                views_count: 0,
                comments_count: 0,
                rating: 0.0,
                votes_count: 0,
                created_at: now,
                updated_at: now,
            };

            match self.repo.create(&post).await {
                Ok(post) => {
                    created = Some(post);
                    break;
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(title = %title, attempt, "Post slug collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.context("Failed to create post").into()),
            }
        }
        let post = created.ok_or_else(|| SlugError::Conflict(title.clone()))?;

        self.repo
            .set_categories(post.id, &input.category_ids)
            .await
            .context("Failed to attach categories")?;

        let tags = self.tags.resolve_names(&input.tags).await?;
        let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_tags(post.id, &tag_ids)
            .await
            .context("Failed to attach tags")?;

        self.with_relations(post).await
    }

    /// Get a post by ID with its categories and tags
    pub async fn get_by_id(
        &self,
        id: i64,
    ) -> Result<Option<PostWithRelations>, PostServiceError> {
        let Some(post) = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
        else {
            return Ok(None);
        };
        Ok(Some(self.with_relations(post).await?))
    }

    /// Get a post by slug with its categories and tags
    pub async fn get_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<PostWithRelations>, PostServiceError> {
        let Some(post) = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get post")?
        else {
            return Ok(None);
        };
        Ok(Some(self.with_relations(post).await?))
    }

    /// List posts with filters and paging
    pub async fn list(
        &self,
        params: &PostListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        self.repo
            .list(params)
            .await
            .context("Failed to list posts")
            .map_err(Into::into)
    }

    /// Update a post. Admins can edit anything, authors only their own
    /// posts. Changing the title regenerates the slug; the post's own
    /// slug is excluded from the collision scan so an unchanged title
    /// keeps it.
    pub async fn update(
        &self,
        id: i64,
        input: UpdatePostInput,
        actor: &User,
    ) -> Result<PostWithRelations, PostServiceError> {
        let mut post = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("id {}", id)))?;

        if !actor.can_edit(post.author_id) {
            return Err(PostServiceError::PermissionDenied);
        }

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(PostServiceError::ValidationError(
                    "Post title cannot be empty".to_string(),
                ));
            }
            if title != post.title {
                let repo = self.repo.clone();
                post.slug = assign_slug(&title, move |candidate| {
                    let repo = repo.clone();
                    async move { repo.slug_exists(&candidate, Some(id)).await }
                })
                .await?;
            }
            post.title = title;
        }
        if let Some(excerpt) = input.excerpt {
            post.excerpt = excerpt;
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(PostServiceError::ValidationError(
                    "Post content cannot be empty".to_string(),
                ));
            }
            post.content = content;
        }
        if let Some(is_published) = input.is_published {
            // First publication stamps published_at; unpublishing keeps it
            if is_published && post.published_at.is_none() {
                post.published_at = Some(Utc::now());
            }
            post.is_published = is_published;
        }
        if let Some(is_featured) = input.is_featured {
            post.is_featured = is_featured;
        }
        if let Some(is_pinned) = input.is_pinned {
            post.is_pinned = is_pinned;
        }
        if let Some(allow_comments) = input.allow_comments {
            post.allow_comments = allow_comments;
        }

        let post = self
            .repo
            .update(&post)
            .await
            .context("Failed to update post")?;

        if let Some(category_ids) = input.category_ids {
            for &category_id in &category_ids {
                if self
                    .category_repo
                    .get_by_id(category_id)
                    .await
                    .context("Failed to check category")?
                    .is_none()
                {
                    return Err(PostServiceError::InvalidCategory(category_id));
                }
            }
            self.repo
                .set_categories(post.id, &category_ids)
                .await
                .context("Failed to set categories")?;
        }
        if let Some(tag_names) = input.tags {
            let tags = self.tags.resolve_names(&tag_names).await?;
            let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
            self.repo
                .set_tags(post.id, &tag_ids)
                .await
                .context("Failed to set tags")?;
        }

        self.with_relations(post).await
    }

    /// Delete a post
    pub async fn delete(&self, id: i64, actor: &User) -> Result<(), PostServiceError> {
        let post = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to load post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("id {}", id)))?;

        if !actor.can_edit(post.author_id) {
            return Err(PostServiceError::PermissionDenied);
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete post")?;
        Ok(())
    }

    /// Record a view of a post. Every call counts; repeat views from the
    /// same reader are not deduplicated.
    pub async fn record_view(
        &self,
        post_id: i64,
        user_id: Option<i64>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Result<(), PostServiceError> {
        let recorded = self
            .repo
            .record_view(post_id, user_id, ip_address, user_agent, referer)
            .await
            .context("Failed to record view")?;
        if !recorded {
            return Err(PostServiceError::NotFound(format!("id {}", post_id)));
        }
        Ok(())
    }

    /// Rate a post from 1 to 5. One rating per voter identity; rating
    /// again replaces the previous value without growing the vote count.
    /// Returns the new (average, votes_count) pair.
    pub async fn rate(
        &self,
        post_id: i64,
        user_id: Option<i64>,
        ip_address: Option<&str>,
        rating: i32,
    ) -> Result<(f64, i64), PostServiceError> {
        if !(RATING_MIN..=RATING_MAX).contains(&rating) {
            return Err(PostServiceError::ValidationError(format!(
                "Rating must be between {} and {}",
                RATING_MIN, RATING_MAX
            )));
        }
        let voter = VoterIdentity::resolve(user_id, ip_address)
            .ok_or(PostServiceError::UnidentifiedVoter)?;

        self.repo
            .rate(post_id, &voter, rating)
            .await
            .context("Failed to rate post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("id {}", post_id)))
    }

    /// Most viewed published posts
    pub async fn popular(&self, limit: i64) -> Result<Vec<Post>, PostServiceError> {
        self.repo
            .popular(limit)
            .await
            .context("Failed to list popular posts")
            .map_err(Into::into)
    }

    /// Most recently published posts
    pub async fn recent(&self, limit: i64) -> Result<Vec<Post>, PostServiceError> {
        self.repo
            .recent(limit)
            .await
            .context("Failed to list recent posts")
            .map_err(Into::into)
    }

    /// Featured published posts
    pub async fn featured(&self, limit: i64) -> Result<Vec<Post>, PostServiceError> {
        self.repo
            .featured(limit)
            .await
            .context("Failed to list featured posts")
            .map_err(Into::into)
    }

    async fn with_relations(&self, post: Post) -> Result<PostWithRelations, PostServiceError> {
        let categories = self
            .repo
            .get_categories(post.id)
            .await
            .context("Failed to load post categories")?;
        let tags = self
            .repo
            .get_tags(post.id)
            .await
            .context("Failed to load post tags")?;
        Ok(PostWithRelations {
            post,
            categories,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxPostRepository, SqlxTagRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateUserInput, UserRole};
    use crate::services::user::UserService;
    use sqlx::SqlitePool;

    struct TestContext {
        _pool: SqlitePool,
        service: PostService,
        admin: User,
        author: User,
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
            crate::db::repositories::SqlxSessionRepository::boxed(pool.clone()),
        );
        let admin = users
            .register(CreateUserInput {
                username: "admin".to_string(),
                email: "admin@example.com".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();
        let author = users
            .register(CreateUserInput {
                username: "writer".to_string(),
                email: "writer@example.com".to_string(),
                password: "correct horse battery".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);

        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone()))),
        );

        TestContext {
            _pool: pool,
            service,
            admin,
            author,
        }
    }

    fn post_input(title: &str) -> CreatePostInput {
        CreatePostInput {
            title: title.to_string(),
            excerpt: None,
            content: "Some content".to_string(),
            is_published: true,
            is_featured: false,
            is_pinned: false,
            allow_comments: true,
            category_ids: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_suffixed_slugs() {
        let ctx = setup().await;

        let a = ctx.service.create(post_input("Hello World"), &ctx.author).await.unwrap();
        let b = ctx.service.create(post_input("Hello World"), &ctx.author).await.unwrap();
        let c = ctx.service.create(post_input("Hello World"), &ctx.author).await.unwrap();

        assert_eq!(a.post.slug, "hello-world");
        assert_eq!(b.post.slug, "hello-world-1");
        assert_eq!(c.post.slug, "hello-world-2");
    }

    #[tokio::test]
    async fn test_create_with_tags_creates_and_reuses() {
        let ctx = setup().await;

        let mut input = post_input("Tagged");
        input.tags = vec!["rust".to_string(), "web".to_string()];
        let first = ctx.service.create(input, &ctx.author).await.unwrap();
        assert_eq!(first.tags.len(), 2);

        let mut input = post_input("Also Tagged");
        input.tags = vec!["rust".to_string()];
        let second = ctx.service.create(input, &ctx.author).await.unwrap();

        assert_eq!(second.tags[0].id, first.tags.iter().find(|t| t.name == "rust").unwrap().id);
        assert_eq!(second.tags[0].posts_count, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_category() {
        let ctx = setup().await;

        let mut input = post_input("Categorized");
        input.category_ids = vec![12345];
        let result = ctx.service.create(input, &ctx.author).await;
        assert!(matches!(result, Err(PostServiceError::InvalidCategory(12345))));
    }

    #[tokio::test]
    async fn test_update_permissions() {
        let ctx = setup().await;

        let post = ctx.service.create(post_input("Mine"), &ctx.admin).await.unwrap();

        let result = ctx
            .service
            .update(
                post.post.id,
                UpdatePostInput {
                    title: Some("Stolen".to_string()),
                    ..Default::default()
                },
                &ctx.author,
            )
            .await;
        assert!(matches!(result, Err(PostServiceError::PermissionDenied)));

        // The admin can edit anyone's post
        let theirs = ctx.service.create(post_input("Theirs"), &ctx.author).await.unwrap();
        ctx.service
            .update(
                theirs.post.id,
                UpdatePostInput {
                    title: Some("Edited".to_string()),
                    ..Default::default()
                },
                &ctx.admin,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_regenerates_slug_on_rename() {
        let ctx = setup().await;

        let post = ctx.service.create(post_input("First Draft"), &ctx.author).await.unwrap();
        assert_eq!(post.post.slug, "first-draft");

        let renamed = ctx
            .service
            .update(
                post.post.id,
                UpdatePostInput {
                    title: Some("Final Version".to_string()),
                    ..Default::default()
                },
                &ctx.author,
            )
            .await
            .unwrap();
        assert_eq!(renamed.post.slug, "final-version");

        // An update that does not touch the title keeps the slug
        let published = ctx
            .service
            .update(
                post.post.id,
                UpdatePostInput {
                    is_published: Some(true),
                    ..Default::default()
                },
                &ctx.author,
            )
            .await
            .unwrap();
        assert_eq!(published.post.slug, "final-version");

        // The freed slug is available to a new post
        let successor = ctx.service.create(post_input("First Draft"), &ctx.author).await.unwrap();
        assert_eq!(successor.post.slug, "first-draft");
    }

    #[tokio::test]
    async fn test_record_view_counts_every_call() {
        let ctx = setup().await;

        let post = ctx.service.create(post_input("Viewed"), &ctx.author).await.unwrap();

        for _ in 0..3 {
            ctx.service
                .record_view(post.post.id, None, Some("10.0.0.1"), Some("test-agent"), None)
                .await
                .unwrap();
        }

        let reloaded = ctx.service.get_by_id(post.post.id).await.unwrap().unwrap();
        assert_eq!(reloaded.post.views_count, 3);
    }

    #[tokio::test]
    async fn test_record_view_missing_post() {
        let ctx = setup().await;
        let result = ctx
            .service
            .record_view(999, None, Some("10.0.0.1"), None, None)
            .await;
        assert!(matches!(result, Err(PostServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rating_mean_over_distinct_voters() {
        let ctx = setup().await;
        let post = ctx.service.create(post_input("Rated"), &ctx.author).await.unwrap();
        let id = post.post.id;

        let (avg, count) = ctx.service.rate(id, Some(ctx.admin.id), None, 5).await.unwrap();
        assert_eq!((avg, count), (5.0, 1));

        let (avg, count) = ctx.service.rate(id, Some(ctx.author.id), None, 3).await.unwrap();
        assert_eq!(count, 2);
        assert!((avg - 4.0).abs() < 1e-9);

        // An anonymous voter is a third identity
        let (avg, count) = ctx.service.rate(id, None, Some("10.0.0.1"), 1).await.unwrap();
        assert_eq!(count, 3);
        assert!((avg - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerate_replaces_without_growing_count() {
        let ctx = setup().await;
        let post = ctx.service.create(post_input("Rerated"), &ctx.author).await.unwrap();
        let id = post.post.id;

        ctx.service.rate(id, Some(ctx.admin.id), None, 2).await.unwrap();
        let (avg, count) = ctx.service.rate(id, Some(ctx.admin.id), None, 4).await.unwrap();

        assert_eq!(count, 1);
        assert!((avg - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rate_validation() {
        let ctx = setup().await;
        let post = ctx.service.create(post_input("Bounds"), &ctx.author).await.unwrap();
        let id = post.post.id;

        let result = ctx.service.rate(id, Some(ctx.admin.id), None, 6).await;
        assert!(matches!(result, Err(PostServiceError::ValidationError(_))));

        let result = ctx.service.rate(id, None, None, 3).await;
        assert!(matches!(result, Err(PostServiceError::UnidentifiedVoter)));
    }

    #[tokio::test]
    async fn test_delete_adjusts_tag_counts() {
        let ctx = setup().await;

        let mut input = post_input("Doomed");
        input.tags = vec!["ephemeral".to_string()];
        let post = ctx.service.create(input, &ctx.author).await.unwrap();
        assert_eq!(post.tags[0].posts_count, 1);

        ctx.service.delete(post.post.id, &ctx.author).await.unwrap();

        let tag = ctx.service.tags.get_by_slug("ephemeral").await.unwrap().unwrap();
        assert_eq!(tag.posts_count, 0);
    }

    #[tokio::test]
    async fn test_list_filters_published() {
        let ctx = setup().await;

        ctx.service.create(post_input("Public"), &ctx.author).await.unwrap();
        let mut draft = post_input("Draft");
        draft.is_published = false;
        ctx.service.create(draft, &ctx.author).await.unwrap();

        let published = ctx.service.list(&PostListParams::default()).await.unwrap();
        assert_eq!(published.total, 1);

        let all = ctx
            .service
            .list(&PostListParams {
                is_published: None,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.total, 2);
    }
}

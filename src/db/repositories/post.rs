//! Post repository
//!
//! Database operations for posts, their category/tag associations and the
//! engagement writes (views, ratings). Every operation that touches a
//! denormalized counter together with its backing rows runs in a single
//! transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Category, PagedResult, Post, PostListParams, Tag, VoterIdentity};

use super::category::map_category;
use super::tag::map_tag;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a new post
    async fn create(&self, post: &Post) -> Result<Post>;

    /// Get post by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Get post by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Get the categories associated with a post, ordered by position
    async fn get_categories(&self, post_id: i64) -> Result<Vec<Category>>;

    /// Get the tags associated with a post, ordered by name
    async fn get_tags(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// List posts with filters and paging. Pinned posts sort first, then
    /// newest by publication date.
    async fn list(&self, params: &PostListParams) -> Result<PagedResult<Post>>;

    /// Update a post
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post. Association counters on categories and tags are
    /// decremented in the same transaction; comments, votes, ratings and
    /// views go away via cascade.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Replace a post's category set, adjusting posts_count on both sides
    /// of the diff.
    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()>;

    /// Replace a post's tag set, adjusting posts_count on both sides of
    /// the diff.
    async fn set_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;

    /// Check if a post slug is taken, optionally excluding one row
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Record a view: append a view-log row and bump views_count in one
    /// transaction. Returns false when the post does not exist. Repeat
    /// views are counted; there is no deduplication.
    async fn record_view(
        &self,
        post_id: i64,
        user_id: Option<i64>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Result<bool>;

    /// Upsert a rating for the given voter and fold it into the post's
    /// running mean. Returns the new (rating, votes_count) pair, or None
    /// when the post does not exist.
    async fn rate(
        &self,
        post_id: i64,
        voter: &VoterIdentity,
        rating: i32,
    ) -> Result<Option<(f64, i64)>>;

    /// Most viewed published posts
    async fn popular(&self, limit: i64) -> Result<Vec<Post>>;

    /// Most recently published posts
    async fn recent(&self, limit: i64) -> Result<Vec<Post>>;

    /// Featured published posts
    async fn featured(&self, limit: i64) -> Result<Vec<Post>>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: SqlitePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO posts
               (title, slug, excerpt, content, author_id,
                is_published, is_featured, is_pinned, allow_comments, published_at,
                views_count, comments_count, rating, votes_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, 0, ?, ?)"#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(post.author_id)
        .bind(post.is_published)
        .bind(post.is_featured)
        .bind(post.is_pinned)
        .bind(post.allow_comments)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert post")?;

        Ok(Post {
            id: result.last_insert_rowid(),
            views_count: 0,
            comments_count: 0,
            rating: 0.0,
            votes_count: 0,
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by id")?;
        Ok(row.map(map_post))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get post by slug")?;
        Ok(row.map(map_post))
    }

    async fn get_categories(&self, post_id: i64) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            r#"SELECT c.* FROM categories c
               JOIN post_categories pc ON pc.category_id = c.id
               WHERE pc.post_id = ?
               ORDER BY c.position, c.name"#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get post categories")?;
        Ok(rows.into_iter().map(map_category).collect())
    }

    async fn get_tags(&self, post_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"SELECT t.* FROM tags t
               JOIN post_tags pt ON pt.tag_id = t.id
               WHERE pt.post_id = ?
               ORDER BY t.name"#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get post tags")?;
        Ok(rows.into_iter().map(map_tag).collect())
    }

    async fn list(&self, params: &PostListParams) -> Result<PagedResult<Post>> {
        let mut joins = String::new();
        let mut filters: Vec<&str> = Vec::new();

        if params.category_id.is_some() {
            joins.push_str(" JOIN post_categories pc ON pc.post_id = p.id");
            filters.push("pc.category_id = ?");
        }
        if params.tag_slug.is_some() {
            joins.push_str(" JOIN post_tags pt ON pt.post_id = p.id JOIN tags t ON t.id = pt.tag_id");
            filters.push("t.slug = ?");
        }
        if params.author_id.is_some() {
            filters.push("p.author_id = ?");
        }
        if params.search.is_some() {
            filters.push("(p.title LIKE ? OR p.content LIKE ?)");
        }
        if params.is_published.is_some() {
            filters.push("p.is_published = ?");
        }
        if params.is_featured.is_some() {
            filters.push("p.is_featured = ?");
        }

        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", filters.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(DISTINCT p.id) FROM posts p{}{}",
            joins, where_clause
        );
        let list_sql = format!(
            r#"SELECT DISTINCT p.* FROM posts p{}{}
               ORDER BY p.is_pinned DESC, COALESCE(p.published_at, p.created_at) DESC
               LIMIT ? OFFSET ?"#,
            joins, where_clause
        );

        let search_pattern = params.search.as_ref().map(|s| format!("%{}%", s));

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query(&list_sql);

        // Binds must follow the order the filters were pushed in
        if let Some(category_id) = params.category_id {
            count_query = count_query.bind(category_id);
            list_query = list_query.bind(category_id);
        }
        if let Some(tag_slug) = &params.tag_slug {
            count_query = count_query.bind(tag_slug);
            list_query = list_query.bind(tag_slug);
        }
        if let Some(author_id) = params.author_id {
            count_query = count_query.bind(author_id);
            list_query = list_query.bind(author_id);
        }
        if let Some(pattern) = &search_pattern {
            count_query = count_query.bind(pattern).bind(pattern);
            list_query = list_query.bind(pattern).bind(pattern);
        }
        if let Some(is_published) = params.is_published {
            count_query = count_query.bind(is_published);
            list_query = list_query.bind(is_published);
        }
        if let Some(is_featured) = params.is_featured {
            count_query = count_query.bind(is_featured);
            list_query = list_query.bind(is_featured);
        }

        let total = count_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count posts")?;

        let page = params.page.max(1);
        let per_page = params.per_page.clamp(1, 100);
        let offset = (page - 1) * per_page;

        let rows = list_query
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list posts")?;

        Ok(PagedResult {
            items: rows.into_iter().map(map_post).collect(),
            total,
        })
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        sqlx::query(
            r#"UPDATE posts
               SET title = ?, slug = ?, excerpt = ?, content = ?,
                   is_published = ?, is_featured = ?, is_pinned = ?,
                   allow_comments = ?, published_at = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(post.is_published)
        .bind(post.is_featured)
        .bind(post.is_pinned)
        .bind(post.allow_comments)
        .bind(post.published_at)
        .bind(now)
        .bind(post.id)
        .execute(&self.pool)
        .await
        .context("Failed to update post")?;

        Ok(Post {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let category_ids: Vec<i64> =
            sqlx::query_scalar("SELECT category_id FROM post_categories WHERE post_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to load post categories for delete")?;
        let tag_ids: Vec<i64> =
            sqlx::query_scalar("SELECT tag_id FROM post_tags WHERE post_id = ?")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to load post tags for delete")?;

        for category_id in category_ids {
            sqlx::query("UPDATE categories SET posts_count = MAX(0, posts_count - 1) WHERE id = ?")
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust category posts_count")?;
        }
        for tag_id in tag_ids {
            sqlx::query("UPDATE tags SET posts_count = MAX(0, posts_count - 1) WHERE id = ?")
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust tag posts_count")?;
        }

        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete post")?;

        tx.commit().await.context("Failed to commit delete")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current: Vec<i64> =
            sqlx::query_scalar("SELECT category_id FROM post_categories WHERE post_id = ?")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to load current categories")?;

        let current: HashSet<i64> = current.into_iter().collect();
        let wanted: HashSet<i64> = category_ids.iter().copied().collect();

        for &category_id in wanted.difference(&current) {
            sqlx::query("INSERT INTO post_categories (post_id, category_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to attach category")?;
            sqlx::query("UPDATE categories SET posts_count = posts_count + 1 WHERE id = ?")
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust category posts_count")?;
        }

        for &category_id in current.difference(&wanted) {
            sqlx::query("DELETE FROM post_categories WHERE post_id = ? AND category_id = ?")
                .bind(post_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to detach category")?;
            sqlx::query("UPDATE categories SET posts_count = MAX(0, posts_count - 1) WHERE id = ?")
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust category posts_count")?;
        }

        tx.commit().await.context("Failed to commit category set")?;
        Ok(())
    }

    async fn set_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current: Vec<i64> =
            sqlx::query_scalar("SELECT tag_id FROM post_tags WHERE post_id = ?")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await
                .context("Failed to load current tags")?;

        let current: HashSet<i64> = current.into_iter().collect();
        let wanted: HashSet<i64> = tag_ids.iter().copied().collect();

        for &tag_id in wanted.difference(&current) {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to attach tag")?;
            sqlx::query("UPDATE tags SET posts_count = posts_count + 1 WHERE id = ?")
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust tag posts_count")?;
        }

        for &tag_id in current.difference(&wanted) {
            sqlx::query("DELETE FROM post_tags WHERE post_id = ? AND tag_id = ?")
                .bind(post_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to detach tag")?;
            sqlx::query("UPDATE tags SET posts_count = MAX(0, posts_count - 1) WHERE id = ?")
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to adjust tag posts_count")?;
        }

        tx.commit().await.context("Failed to commit tag set")?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE slug = ? AND (? IS NULL OR id != ?)",
        )
        .bind(slug)
        .bind(exclude_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check post slug")?;
        Ok(count > 0)
    }

    async fn record_view(
        &self,
        post_id: i64,
        user_id: Option<i64>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query("UPDATE posts SET views_count = views_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to bump views_count")?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"INSERT INTO post_views (post_id, user_id, ip_address, user_agent, referer, viewed_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(ip_address)
        .bind(user_agent)
        .bind(referer)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to insert view row")?;

        tx.commit().await.context("Failed to commit view")?;
        Ok(true)
    }

    async fn rate(
        &self,
        post_id: i64,
        voter: &VoterIdentity,
        rating: i32,
    ) -> Result<Option<(f64, i64)>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let post_row = sqlx::query("SELECT rating, votes_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load post for rating")?;

        let Some(post_row) = post_row else {
            return Ok(None);
        };
        let current_avg: f64 = post_row.get("rating");
        let votes_count: i64 = post_row.get("votes_count");

        // One bound identity column is NULL, so equality against it never
        // matches and only the presented identity is looked up.
        let existing = sqlx::query(
            "SELECT id, rating FROM post_ratings WHERE post_id = ? AND (user_id = ? OR ip_address = ?)",
        )
        .bind(post_id)
        .bind(voter.user_id())
        .bind(voter.ip_address())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up existing rating")?;

        let (new_avg, new_count) = match existing {
            Some(row) => {
                let rating_id: i64 = row.get("id");
                let old_rating: i32 = row.get("rating");

                sqlx::query("UPDATE post_ratings SET rating = ? WHERE id = ?")
                    .bind(rating)
                    .bind(rating_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update rating row")?;

                let new_avg = if votes_count > 0 {
                    (current_avg * votes_count as f64 - old_rating as f64 + rating as f64)
                        / votes_count as f64
                } else {
                    rating as f64
                };
                (new_avg, votes_count)
            }
            None => {
                sqlx::query(
                    r#"INSERT INTO post_ratings (post_id, user_id, ip_address, rating, created_at)
                       VALUES (?, ?, ?, ?, ?)"#,
                )
                .bind(post_id)
                .bind(voter.user_id())
                .bind(voter.ip_address())
                .bind(rating)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .context("Failed to insert rating row")?;

                let new_count = votes_count + 1;
                let new_avg =
                    (current_avg * votes_count as f64 + rating as f64) / new_count as f64;
                (new_avg, new_count)
            }
        };

        sqlx::query("UPDATE posts SET rating = ?, votes_count = ? WHERE id = ?")
            .bind(new_avg)
            .bind(new_count)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to store post rating")?;

        tx.commit().await.context("Failed to commit rating")?;
        Ok(Some((new_avg, new_count)))
    }

    async fn popular(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            "SELECT * FROM posts WHERE is_published = 1 ORDER BY views_count DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list popular posts")?;
        Ok(rows.into_iter().map(map_post).collect())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"SELECT * FROM posts WHERE is_published = 1
               ORDER BY COALESCE(published_at, created_at) DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent posts")?;
        Ok(rows.into_iter().map(map_post).collect())
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"SELECT * FROM posts WHERE is_published = 1 AND is_featured = 1
               ORDER BY COALESCE(published_at, created_at) DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list featured posts")?;
        Ok(rows.into_iter().map(map_post).collect())
    }
}

pub(crate) fn map_post(r: sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: r.get("id"),
        title: r.get("title"),
        slug: r.get("slug"),
        excerpt: r.get("excerpt"),
        content: r.get("content"),
        author_id: r.get("author_id"),
        is_published: r.get("is_published"),
        is_featured: r.get("is_featured"),
        is_pinned: r.get("is_pinned"),
        allow_comments: r.get("allow_comments"),
        published_at: r.get("published_at"),
        views_count: r.get("views_count"),
        comments_count: r.get("comments_count"),
        rating: r.get("rating"),
        votes_count: r.get("votes_count"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

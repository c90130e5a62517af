//! Comment repository
//!
//! Database operations for comments, their like/dislike votes and the
//! `comments_count` upkeep on posts. Counter writes always share a
//! transaction with the rows they summarize.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Comment, CommentThread, CreateCommentInput, VoterIdentity};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a comment. When it lands approved, the post's
    /// comments_count is bumped in the same transaction.
    async fn create(
        &self,
        input: &CreateCommentInput,
        author_id: Option<i64>,
        ip_address: Option<&str>,
        is_approved: bool,
    ) -> Result<Comment>;

    /// Get comment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// List a post's comments as threads. Top-level comments are paginated,
    /// pinned first then newest; replies ride along unpaginated, oldest
    /// first. Returns the threads and the total top-level count.
    async fn list_by_post(
        &self,
        post_id: i64,
        page: i64,
        per_page: i64,
        approved_only: bool,
    ) -> Result<(Vec<CommentThread>, i64)>;

    /// Delete a comment. Replies cascade away, so the post's
    /// comments_count is recomputed rather than decremented.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Approve or unapprove a comment, adjusting the post's
    /// comments_count on a state change.
    async fn set_approved(&self, id: i64, approved: bool) -> Result<bool>;

    /// Pin or unpin a comment
    async fn set_pinned(&self, id: i64, pinned: bool) -> Result<bool>;

    /// Apply a like/dislike vote for the given voter. `vote` is +1, -1
    /// or 0 to retract. Returns the new (likes_count, dislikes_count)
    /// pair, or None when the comment does not exist.
    async fn vote(
        &self,
        comment_id: i64,
        voter: &VoterIdentity,
        vote: i32,
    ) -> Result<Option<(i64, i64)>>;

    /// List comments awaiting moderation, oldest first
    async fn list_pending(&self, page: i64, per_page: i64) -> Result<Vec<Comment>>;

    /// Count comments awaiting moderation
    async fn count_pending(&self) -> Result<i64>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: SqlitePool,
}

impl SqlxCommentRepository {
    /// Create a new SQLx comment repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(
        &self,
        input: &CreateCommentInput,
        author_id: Option<i64>,
        ip_address: Option<&str>,
        is_approved: bool,
    ) -> Result<Comment> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"INSERT INTO comments
               (post_id, author_id, guest_name, parent_id, content,
                is_approved, is_pinned, likes_count, dislikes_count, ip_address,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?)"#,
        )
        .bind(input.post_id)
        .bind(author_id)
        .bind(&input.guest_name)
        .bind(input.parent_id)
        .bind(&input.content)
        .bind(is_approved)
        .bind(ip_address)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to insert comment")?;

        if is_approved {
            sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = ?")
                .bind(input.post_id)
                .execute(&mut *tx)
                .await
                .context("Failed to bump comments_count")?;
        }

        tx.commit().await.context("Failed to commit comment")?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id: input.post_id,
            author_id,
            guest_name: input.guest_name.clone(),
            parent_id: input.parent_id,
            content: input.content.clone(),
            is_approved,
            is_pinned: false,
            likes_count: 0,
            dislikes_count: 0,
            ip_address: ip_address.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment by id")?;
        Ok(row.map(map_comment))
    }

    async fn list_by_post(
        &self,
        post_id: i64,
        page: i64,
        per_page: i64,
        approved_only: bool,
    ) -> Result<(Vec<CommentThread>, i64)> {
        let approval_filter = if approved_only { " AND is_approved = 1" } else { "" };

        let count_sql = format!(
            "SELECT COUNT(*) FROM comments WHERE post_id = ? AND parent_id IS NULL{}",
            approval_filter
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comments")?;

        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = (page - 1) * per_page;

        let top_sql = format!(
            r#"SELECT * FROM comments
               WHERE post_id = ? AND parent_id IS NULL{}
               ORDER BY is_pinned DESC, created_at DESC
               LIMIT ? OFFSET ?"#,
            approval_filter
        );
        let top_level: Vec<Comment> = sqlx::query(&top_sql)
            .bind(post_id)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list top-level comments")?
            .into_iter()
            .map(map_comment)
            .collect();

        let replies_sql = format!(
            r#"SELECT * FROM comments
               WHERE post_id = ? AND parent_id IS NOT NULL{}
               ORDER BY created_at ASC"#,
            approval_filter
        );
        let replies: Vec<Comment> = sqlx::query(&replies_sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list replies")?
            .into_iter()
            .map(map_comment)
            .collect();

        // Threads are shallow: every reply hangs off its top-level
        // ancestor no matter how deep the parent chain goes.
        let mut parents: HashMap<i64, Option<i64>> = HashMap::new();
        for comment in &top_level {
            parents.insert(comment.id, None);
        }
        for reply in &replies {
            parents.insert(reply.id, reply.parent_id);
        }
        let root_of = |mut id: i64| -> i64 {
            while let Some(Some(parent)) = parents.get(&id) {
                id = *parent;
            }
            id
        };

        let mut grouped: HashMap<i64, Vec<Comment>> = HashMap::new();
        for reply in replies {
            grouped.entry(root_of(reply.id)).or_default().push(reply);
        }

        let threads = top_level
            .into_iter()
            .map(|comment| {
                let replies = grouped.remove(&comment.id).unwrap_or_default();
                CommentThread { comment, replies }
            })
            .collect();

        Ok((threads, total))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT post_id FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load comment for delete")?;

        let Some(row) = row else {
            return Ok(false);
        };
        let post_id: i64 = row.get("post_id");

        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete comment")?;

        // The delete cascades to an unknown number of replies, so the
        // aggregate is recomputed instead of decremented.
        sqlx::query(
            r#"UPDATE posts
               SET comments_count = (SELECT COUNT(*) FROM comments WHERE post_id = ? AND is_approved = 1)
               WHERE id = ?"#,
        )
        .bind(post_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to recompute comments_count")?;

        tx.commit().await.context("Failed to commit delete")?;
        Ok(true)
    }

    async fn set_approved(&self, id: i64, approved: bool) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query("SELECT post_id, is_approved FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load comment for approval")?;

        let Some(row) = row else {
            return Ok(false);
        };
        let post_id: i64 = row.get("post_id");
        let current: bool = row.get("is_approved");

        if current == approved {
            return Ok(true);
        }

        sqlx::query("UPDATE comments SET is_approved = ?, updated_at = ? WHERE id = ?")
            .bind(approved)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to set approval")?;

        let delta = if approved { 1 } else { -1 };
        sqlx::query("UPDATE posts SET comments_count = MAX(0, comments_count + ?) WHERE id = ?")
            .bind(delta)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to adjust comments_count")?;

        tx.commit().await.context("Failed to commit approval")?;
        Ok(true)
    }

    async fn set_pinned(&self, id: i64, pinned: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE comments SET is_pinned = ?, updated_at = ? WHERE id = ?")
            .bind(pinned)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to set pinned")?;
        Ok(result.rows_affected() > 0)
    }

    async fn vote(
        &self,
        comment_id: i64,
        voter: &VoterIdentity,
        vote: i32,
    ) -> Result<Option<(i64, i64)>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load comment for vote")?;
        if exists.is_none() {
            return Ok(None);
        }

        // One bound identity column is NULL, so equality against it never
        // matches and only the presented identity is looked up.
        let existing = sqlx::query(
            "SELECT id, vote FROM comment_votes WHERE comment_id = ? AND (user_id = ? OR ip_address = ?)",
        )
        .bind(comment_id)
        .bind(voter.user_id())
        .bind(voter.ip_address())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up existing vote")?;

        match (existing, vote) {
            (Some(row), 0) => {
                let vote_id: i64 = row.get("id");
                let old_vote: i32 = row.get("vote");
                sqlx::query("DELETE FROM comment_votes WHERE id = ?")
                    .bind(vote_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete vote row")?;
                let column = if old_vote > 0 { "likes_count" } else { "dislikes_count" };
                sqlx::query(&format!(
                    "UPDATE comments SET {0} = MAX(0, {0} - 1) WHERE id = ?",
                    column
                ))
                .bind(comment_id)
                .execute(&mut *tx)
                .await
                .context("Failed to retract vote")?;
            }
            (None, 0) => {}
            (Some(row), _) => {
                let vote_id: i64 = row.get("id");
                let old_vote: i32 = row.get("vote");
                if old_vote != vote {
                    sqlx::query("UPDATE comment_votes SET vote = ? WHERE id = ?")
                        .bind(vote)
                        .bind(vote_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to flip vote row")?;
                    let (up, down) = if vote > 0 {
                        ("likes_count", "dislikes_count")
                    } else {
                        ("dislikes_count", "likes_count")
                    };
                    sqlx::query(&format!(
                        "UPDATE comments SET {0} = {0} + 1, {1} = MAX(0, {1} - 1) WHERE id = ?",
                        up, down
                    ))
                    .bind(comment_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to flip counters")?;
                }
                // Same sign again is a no-op
            }
            (None, _) => {
                sqlx::query(
                    r#"INSERT INTO comment_votes (comment_id, user_id, ip_address, vote, created_at)
                       VALUES (?, ?, ?, ?, ?)"#,
                )
                .bind(comment_id)
                .bind(voter.user_id())
                .bind(voter.ip_address())
                .bind(vote)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .context("Failed to insert vote row")?;
                let column = if vote > 0 { "likes_count" } else { "dislikes_count" };
                sqlx::query(&format!(
                    "UPDATE comments SET {0} = {0} + 1 WHERE id = ?",
                    column
                ))
                .bind(comment_id)
                .execute(&mut *tx)
                .await
                .context("Failed to count vote")?;
            }
        }

        let row = sqlx::query("SELECT likes_count, dislikes_count FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to read vote counters")?;
        let counts = (row.get("likes_count"), row.get("dislikes_count"));

        tx.commit().await.context("Failed to commit vote")?;
        Ok(Some(counts))
    }

    async fn list_pending(&self, page: i64, per_page: i64) -> Result<Vec<Comment>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let rows = sqlx::query(
            r#"SELECT * FROM comments WHERE is_approved = 0
               ORDER BY created_at ASC LIMIT ? OFFSET ?"#,
        )
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending comments")?;
        Ok(rows.into_iter().map(map_comment).collect())
    }

    async fn count_pending(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE is_approved = 0")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending comments")?;
        Ok(count)
    }
}

pub(crate) fn map_comment(r: sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: r.get("id"),
        post_id: r.get("post_id"),
        author_id: r.get("author_id"),
        guest_name: r.get("guest_name"),
        parent_id: r.get("parent_id"),
        content: r.get("content"),
        is_approved: r.get("is_approved"),
        is_pinned: r.get("is_pinned"),
        likes_count: r.get("likes_count"),
        dislikes_count: r.get("dislikes_count"),
        ip_address: r.get("ip_address"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

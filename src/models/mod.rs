//! Data models
//!
//! This module contains all data structures used throughout the Folio
//! content service:
//! - Database entities (Post, Category, Tag, Comment, User, Session)
//! - The voter identity engagement rows are keyed by
//! - Input types for create/update operations

mod category;
mod comment;
mod post;
mod session;
mod tag;
mod user;
mod voter;

pub use category::{Category, CategoryNode, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{Comment, CommentThread, CreateCommentInput};
pub use post::{
    CreatePostInput, PagedResult, Post, PostListParams, PostWithRelations, UpdatePostInput,
};
pub use session::Session;
pub use tag::Tag;
pub use user::{CreateUserInput, User, UserRole};
pub use voter::VoterIdentity;

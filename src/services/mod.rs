//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories:
//! validation, permissions, slug assignment and the engagement
//! aggregation invariants.

pub mod category;
pub mod comment;
pub mod post;
pub mod settings;
pub mod slug;
pub mod tag;
pub mod user;

pub use category::{CategoryService, CategoryServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use post::{PostService, PostServiceError};
pub use settings::{SettingsService, SettingsServiceError};
pub use slug::{assign_slug, slugify, SlugError};
pub use tag::{TagService, TagServiceError};
pub use user::{hash_password, verify_password, UserService, UserServiceError};

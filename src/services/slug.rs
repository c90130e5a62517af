//! Slug derivation and assignment
//!
//! Slugs are derived from display names and made unique per entity table
//! by scanning numeric suffixes (`my-post`, `my-post-1`, `my-post-2`, ...)
//! until a free one is found.

use anyhow::Result;
use std::future::Future;

/// How many times a create is retried when a concurrent writer claims the
/// chosen slug between the availability check and the insert.
pub const MAX_SLUG_ATTEMPTS: u32 = 5;

/// Error types for slug assignment
#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    /// The name contains no usable characters
    #[error("Cannot derive a slug from '{0}'")]
    InvalidName(String),

    /// No free slug could be claimed
    #[error("Could not assign a unique slug for '{0}'")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Derive a slug from a display name.
///
/// Lowercases, keeps ASCII alphanumerics, maps everything else to hyphens
/// and collapses runs. The output only ever contains lowercase ASCII
/// alphanumerics and single interior hyphens; a name with no usable
/// characters slugifies to the empty string.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    // Remove consecutive hyphens and trim hyphens from ends
    let mut result = String::new();
    let mut prev_hyphen = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_hyphen && !result.is_empty() {
                result.push(c);
                prev_hyphen = true;
            }
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    result.trim_end_matches('-').to_string()
}

/// Derive a slug from `name` and make it unique against `exists`.
///
/// The base slug is tried first, then `-1`, `-2` suffixes until `exists`
/// reports a free one. The check-then-insert window is not closed here;
/// callers retry the insert on a unique violation (see
/// [`MAX_SLUG_ATTEMPTS`]).
pub async fn assign_slug<E, Fut>(name: &str, exists: E) -> Result<String, SlugError>
where
    E: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let base = slugify(name);
    if base.is_empty() {
        return Err(SlugError::InvalidName(name.to_string()));
    }

    if !exists(base.clone()).await? {
        return Ok(base);
    }

    for n in 1u64..=10_000 {
        let candidate = format!("{}-{}", base, n);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    Err(SlugError::Conflict(name.to_string()))
}

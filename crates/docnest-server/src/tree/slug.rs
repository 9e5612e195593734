use crate::error::AppError;

pub const MAX_SLUG_LEN: usize = 100;

/// Accepts `^[A-Za-z0-9_-]{1,100}$`.
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.is_empty() {
        return Err(AppError::InvalidSlug("slug must not be empty".to_string()));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(AppError::InvalidSlug(format!(
            "slug must be at most {MAX_SLUG_LEN} characters"
        )));
    }
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(AppError::InvalidSlug(format!(
            "'{slug}' contains '{bad}'; only letters, digits, '-' and '_' are allowed"
        )));
    }
    Ok(())
}

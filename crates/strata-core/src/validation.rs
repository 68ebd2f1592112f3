//! Bucket name and object key validation.
//!
//! Stricter than the filesystem sanitization in `strata-meta`: these rules
//! gate what names are accepted at all, while sanitization only keeps
//! whatever reaches the repositories from escaping the metadata root.

use crate::error::{ServiceError, ServiceResult};

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object key length.
const MAX_KEY_LEN: usize = 1024;

/// Validate a bucket name.
///
/// Rules: 3-63 characters; lowercase alphanumerics plus `.` and `-`; must
/// not start or end with a dot; no consecutive dots; no `xn--` prefix.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] describing the first violated
/// rule.
pub fn validate_bucket_name(name: &str) -> ServiceResult<()> {
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
        return Err(invalid(format!(
            "bucket name must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters: {name}"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return Err(invalid(format!(
            "bucket name may only contain lowercase letters, digits, dots, and hyphens: {name}"
        )));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(format!(
            "bucket name must not start or end with a dot: {name}"
        )));
    }

    if name.contains("..") {
        return Err(invalid(format!(
            "bucket name must not contain consecutive dots: {name}"
        )));
    }

    if name.starts_with("xn--") {
        return Err(invalid(format!(
            "bucket name must not start with the reserved prefix xn--: {name}"
        )));
    }

    Ok(())
}

/// Validate an object key: up to 1024 characters and not whitespace-only.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidArgument`] when the key is empty,
/// whitespace-only, or too long.
pub fn validate_object_key(key: &str) -> ServiceResult<()> {
    if key.trim().is_empty() {
        return Err(invalid("object key must not be empty".to_owned()));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(invalid(format!(
            "object key must not exceed {MAX_KEY_LEN} characters"
        )));
    }
    Ok(())
}

fn invalid(message: String) -> ServiceError {
    ServiceError::InvalidArgument { message }
}

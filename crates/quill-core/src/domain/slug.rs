use crate::error::DomainError;

const MAX_SLUG_LEN: usize = 200;

/// Check that a slug can be used as a single URL path segment.
pub fn validate_slug(slug: &str) -> Result<(), DomainError> {
    if slug.trim().is_empty() {
        return Err(DomainError::Validation("Slug must not be empty".to_string()));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(DomainError::Validation(format!(
            "Slug must be at most {} characters",
            MAX_SLUG_LEN
        )));
    }
    if slug
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(DomainError::Validation(
            "Slug must not contain whitespace, '/', '?', '#' or '%'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("hello-world").is_ok());
        assert!(validate_slug("2009/01/old-post").is_err());
        assert!(validate_slug("  ").is_err());
        assert!(validate_slug("has space").is_err());
    }
}

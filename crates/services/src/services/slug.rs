//! Slugs and name validation shared by pages, channels and repositories.

use thiserror::Error;

pub const MAX_CHANNEL_NAME_LEN: usize = 80;
pub const MAX_REPO_NAME_LEN: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is required")]
    Empty,
    #[error("name must be at most {0} characters")]
    TooLong(usize),
    #[error("name may only contain letters, digits, '.', '-' and '_'")]
    InvalidCharacters,
    #[error("name '{0}' is reserved")]
    Reserved(String),
}

/// Lowercase ASCII slug; runs of anything else collapse to a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// `base`, or `base-2`, `base-3`, … whichever is not taken.
pub fn unique_slug<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.as_ref() == candidate);
    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Channel names are lowercase kebab-case.
pub fn channel_name(raw: &str) -> Result<String, NameError> {
    let name = slugify(raw);
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(NameError::TooLong(MAX_CHANNEL_NAME_LEN));
    }
    Ok(name)
}

pub fn validate_repo_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_REPO_NAME_LEN {
        return Err(NameError::TooLong(MAX_REPO_NAME_LEN));
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved(name.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(NameError::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Getting Started!"), "getting-started");
        assert_eq!(slugify("  SDBQL -- Joins & Views  "), "sdbql-joins-views");
        assert_eq!(slugify("Élan vital"), "lan-vital");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let taken = vec!["intro".to_string(), "intro-2".to_string()];
        assert_eq!(unique_slug("intro", &taken), "intro-3");
        assert_eq!(unique_slug("other", &taken), "other");
    }

    #[test]
    fn channel_names() {
        assert_eq!(channel_name("General Chat").unwrap(), "general-chat");
        assert_eq!(channel_name("!!!"), Err(NameError::Empty));
        let long = "a".repeat(81);
        assert_eq!(channel_name(&long), Err(NameError::TooLong(80)));
    }

    #[test]
    fn repo_names() {
        assert!(validate_repo_name("solidb-rs_v2.0").is_ok());
        assert_eq!(validate_repo_name(".."), Err(NameError::Reserved("..".into())));
        assert_eq!(
            validate_repo_name("has space"),
            Err(NameError::InvalidCharacters)
        );
        assert_eq!(validate_repo_name(""), Err(NameError::Empty));
    }
}

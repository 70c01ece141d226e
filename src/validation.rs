//! Field and cross-field validators.
//!
//! Recipe payload checks collect every failure before returning so a client
//! sees all problems with a submission at once.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::{dto::recipes::IngredientAmountRequest, error::AppError};

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$").expect("valid regex"));

static SLUG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+").expect("valid regex"));

static USERNAME_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"));

/// Usernames matching any of these (anchored at the start) are reserved.
const RESERVED_USERNAMES: [&str; 1] = [r"^me$"];

static RESERVED_USERNAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    RESERVED_USERNAMES
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
});

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_RECIPE_NAME_LEN: usize = 100;
pub const MAX_TAG_FIELD_LEN: usize = 200;

pub fn validate_color(color: &str) -> Result<(), String> {
    if HEX_COLOR.is_match(color) {
        Ok(())
    } else {
        Err(format!("\"{color}\" is not a HEX color"))
    }
}

/// The slug must start with at least one `[-a-zA-Z0-9_]` character.
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if SLUG_PREFIX.is_match(slug) {
        Ok(())
    } else {
        Err(format!("slug \"{slug}\" is not allowed"))
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if RESERVED_USERNAME_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(username))
    {
        return Err(format!("\"{username}\" is not an allowed username"));
    }
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "username must be between 1 and {MAX_USERNAME_LEN} characters"
        ));
    }
    if !USERNAME_FORMAT.is_match(username) {
        return Err("username may contain only letters, digits and @/./+/-/_".into());
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let valid = email.len() <= MAX_EMAIL_LEN
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(format!("\"{email}\" is not a valid email address"))
    }
}

pub fn validate_cooking_time(minutes: i64) -> Result<i32, String> {
    if minutes < 1 {
        return Err("cooking time must be at least 1 minute".into());
    }
    i32::try_from(minutes).map_err(|_| "cooking time is too large".to_string())
}

/// Cross-field checks on a recipe's ingredient and tag lists.
pub fn validate_recipe_links(
    ingredients: &[IngredientAmountRequest],
    tags: &[i64],
) -> Vec<String> {
    let mut errors = Vec::new();
    if ingredients.is_empty() {
        errors.push("add at least one ingredient to the recipe".to_string());
    }

    let mut seen = HashSet::new();
    for ingredient in ingredients {
        if ingredient.amount <= 0 || ingredient.amount > i64::from(i32::MAX) {
            errors.push(format!(
                "amount of ingredient {} must be a positive integer",
                ingredient.id
            ));
        }
        if !seen.insert(ingredient.id) {
            errors.push(format!(
                "ingredient {} is listed more than once",
                ingredient.id
            ));
        }
    }

    let unique_tags: HashSet<&i64> = tags.iter().collect();
    if unique_tags.len() < tags.len() {
        errors.push("the same tag cannot be applied twice".to_string());
    }
    errors
}

/// Scalar recipe fields; `None` means the field was not submitted.
pub struct RecipeScalars<'a> {
    pub name: Option<&'a str>,
    pub text: Option<&'a str>,
    pub cooking_time: Option<i64>,
}

pub fn validate_recipe_scalars(fields: &RecipeScalars<'_>, errors: &mut Vec<String>) {
    if let Some(name) = fields.name {
        if name.trim().is_empty() {
            errors.push("recipe name must not be empty".into());
        } else if name.chars().count() > MAX_RECIPE_NAME_LEN {
            errors.push(format!(
                "recipe name must be at most {MAX_RECIPE_NAME_LEN} characters"
            ));
        }
    }
    if fields.text.is_some_and(|text| text.trim().is_empty()) {
        errors.push("recipe description must not be empty".into());
    }
    if let Some(minutes) = fields.cooking_time {
        if let Err(message) = validate_cooking_time(minutes) {
            errors.push(message);
        }
    }
}

/// Validates a tag's fields, collecting every failure.
pub fn validate_tag_fields(
    name: Option<&str>,
    color: Option<&str>,
    slug: Option<&str>,
) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if let Some(name) = name {
        if name.trim().is_empty() || name.chars().count() > MAX_TAG_FIELD_LEN {
            errors.push(format!(
                "tag name must be between 1 and {MAX_TAG_FIELD_LEN} characters"
            ));
        }
    }
    if let Some(Err(message)) = color.map(validate_color) {
        errors.push(message);
    }
    if let Some(slug) = slug {
        if let Err(message) = validate_slug(slug) {
            errors.push(message);
        } else if slug.chars().count() > MAX_TAG_FIELD_LEN {
            errors.push(format!("slug must be at most {MAX_TAG_FIELD_LEN} characters"));
        }
    }
    into_result(errors)
}

pub fn into_result(errors: Vec<String>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, amount: i64) -> IngredientAmountRequest {
        IngredientAmountRequest { id, amount }
    }

    #[test]
    fn accepts_long_and_short_hex_colors() {
        assert!(validate_color("#AFB83B").is_ok());
        assert!(validate_color("#fa0").is_ok());
        assert!(validate_color("AFB83B").is_err());
        assert!(validate_color("#AFB83").is_err());
        assert!(validate_color("#GGGGGG").is_err());
    }

    #[test]
    fn slug_only_needs_a_valid_prefix() {
        assert!(validate_slug("breakfast").is_ok());
        assert!(validate_slug("late-night_2").is_ok());
        assert!(validate_slug("ok then").is_ok());
        assert!(validate_slug(" leading-space").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn rejects_reserved_and_malformed_usernames() {
        assert!(validate_username("me").is_err());
        assert!(validate_username("meal_planner").is_ok());
        assert!(validate_username("with space").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"x".repeat(151)).is_err());
    }

    #[test]
    fn cooking_time_must_be_positive() {
        assert_eq!(validate_cooking_time(1), Ok(1));
        assert!(validate_cooking_time(0).is_err());
        assert!(validate_cooking_time(-5).is_err());
    }

    #[test]
    fn clean_links_produce_no_errors() {
        let errors = validate_recipe_links(&[item(1, 2), item(2, 1)], &[1, 2]);
        assert!(errors.is_empty());
    }

    #[test]
    fn empty_ingredient_list_is_rejected() {
        let errors = validate_recipe_links(&[], &[1]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least one ingredient"));
    }

    #[test]
    fn repeated_ingredient_is_reported() {
        let errors = validate_recipe_links(&[item(7, 1), item(7, 3)], &[]);
        assert_eq!(errors, vec!["ingredient 7 is listed more than once".to_string()]);
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        let errors = validate_recipe_links(&[item(1, 0), item(2, -4)], &[]);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.contains("positive integer")));
    }

    #[test]
    fn every_failure_is_collected() {
        let errors = validate_recipe_links(&[item(1, 0), item(1, 2)], &[3, 3]);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("tag")));
    }

    #[test]
    fn scalar_checks_skip_missing_fields() {
        let mut errors = Vec::new();
        validate_recipe_scalars(
            &RecipeScalars {
                name: None,
                text: None,
                cooking_time: None,
            },
            &mut errors,
        );
        assert!(errors.is_empty());

        validate_recipe_scalars(
            &RecipeScalars {
                name: Some(" "),
                text: Some(""),
                cooking_time: Some(0),
            },
            &mut errors,
        );
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn tag_errors_are_aggregated() {
        let err = validate_tag_fields(Some("Brunch"), Some("red"), Some("?")).unwrap_err();
        match err {
            AppError::Validation(messages) => assert_eq!(messages.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(validate_tag_fields(Some("Brunch"), Some("#FF9933"), Some("brunch")).is_ok());
    }

    #[test]
    fn email_needs_local_part_and_domain() {
        assert!(validate_email("cook@example.com").is_ok());
        assert!(validate_email("cook@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
    }
}

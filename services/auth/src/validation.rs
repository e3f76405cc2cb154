//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Normalize an email so aliases of one mailbox map to one account.
///
/// Gmail ignores dots and `+tag` suffixes; Outlook, Hotmail, Live and Yahoo
/// ignore `+tag` suffixes. Everything else is only trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    let lowered = email.trim().to_lowercase();

    let Some((local, domain)) = lowered.split_once('@') else {
        return lowered;
    };
    if local.is_empty() || domain.is_empty() {
        return lowered;
    }

    let untagged = local.split('+').next().unwrap_or(local);

    match domain {
        "gmail.com" | "googlemail.com" => format!("{}@gmail.com", untagged.replace('.', "")),
        d if d.ends_with("outlook.com")
            || d.ends_with("hotmail.com")
            || d.ends_with("live.com")
            || d.ends_with("yahoo.com")
            || d.ends_with("ymail.com") =>
        {
            format!("{}@{}", untagged, domain)
        }
        _ => lowered,
    }
}

/// Validate password strength, reporting every rule that fails
pub fn validate_password(password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if password.chars().count() < 8 {
        errors.push("Password must be at least 8 characters long".to_string());
    }

    if password.chars().count() > 128 {
        errors.push("Password must be at most 128 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }

    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a display name
pub fn validate_display_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();

    if trimmed.chars().count() < 2 {
        return Err("Display name must be at least 2 characters long".to_string());
    }

    if trimmed.chars().count() > 50 {
        return Err("Display name must not exceed 50 characters".to_string());
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') {
        return Err("Display name can only contain letters and spaces".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_password() {
        assert!(validate_password("Paradise#2024").is_ok());
    }

    #[test]
    fn test_password_reports_all_failures() {
        let errors = validate_password("short").unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("8 characters")));
        assert!(errors.iter().any(|e| e.contains("uppercase")));
        assert!(errors.iter().any(|e| e.contains("number")));
        assert!(errors.iter().any(|e| e.contains("special")));
    }

    #[test]
    fn test_password_special_characters_are_from_the_allowed_set() {
        // A space or an accented letter is not a special character
        assert!(validate_password("Paradise 2024").is_err());
        assert!(validate_password("Paradisé2024").is_err());
        assert!(validate_password("Paradise/2024").is_ok());
        assert!(validate_password("Paradise\\2024").is_ok());
    }

    #[test]
    fn test_password_upper_bound() {
        let long = format!("Aa1!{}", "x".repeat(125));
        assert!(validate_password(&long).is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("guest@houseofparadise.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_gmail_normalization() {
        assert_eq!(normalize_email(" John.Doe+trips@GMail.com "), "johndoe@gmail.com");
        assert_eq!(normalize_email("john.doe@googlemail.com"), "johndoe@gmail.com");
    }

    #[test]
    fn test_plus_tag_providers_keep_dots() {
        assert_eq!(normalize_email("jane.doe+x@outlook.com"), "jane.doe@outlook.com");
        assert_eq!(normalize_email("jane+x@yahoo.com"), "jane@yahoo.com");
        assert_eq!(normalize_email("jane+x@live.com"), "jane@live.com");
    }

    #[test]
    fn test_other_providers_untouched() {
        assert_eq!(normalize_email("First.Last+tag@Example.org"), "first.last+tag@example.org");
        assert_eq!(normalize_email("broken"), "broken");
    }

    #[test]
    fn test_display_name() {
        assert!(validate_display_name("Ada Lovelace").is_ok());
        assert!(validate_display_name(" A ").is_err());
        assert!(validate_display_name("R2D2").is_err());
        assert!(validate_display_name(&"a".repeat(51)).is_err());
    }
}

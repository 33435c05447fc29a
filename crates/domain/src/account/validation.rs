//! Field rules for account data.

use super::AccountError;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 100;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*";

pub fn validate_name(name: &str) -> Result<(), AccountError> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(AccountError::invalid("name", "Name is required"));
    }
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(AccountError::invalid(
            "name",
            format!("Name must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters"),
        ));
    }
    Ok(())
}

/// Lower-cases and trims an e-mail address, then checks its shape.
pub fn normalize_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AccountError::invalid("email", "Email is required"));
    }
    if email.len() > EMAIL_MAX_LEN || !looks_like_email(&email) {
        return Err(AccountError::invalid(
            "email",
            "Please provide a valid email address",
        ));
    }
    Ok(email)
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| !l.is_empty())
        && labels.last().is_some_and(|tld| tld.len() >= 2)
}

/// Checks password strength. The first failed rule is reported.
pub fn validate_password(field: &'static str, password: &str) -> Result<(), AccountError> {
    let rules: [(bool, String); 5] = [
        (
            password.chars().count() >= PASSWORD_MIN_LEN,
            format!("Password must be at least {PASSWORD_MIN_LEN} characters long"),
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Password must contain at least one uppercase letter".to_string(),
        ),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Password must contain at least one lowercase letter".to_string(),
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one digit".to_string(),
        ),
        (
            password.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
            format!("Password must contain at least one special character ({PASSWORD_SPECIALS})"),
        ),
    ];

    if password.is_empty() {
        return Err(AccountError::invalid(field, "Password is required"));
    }
    match rules.into_iter().find(|(ok, _)| !ok) {
        Some((_, message)) => Err(AccountError::invalid(field, message)),
        None => Ok(()),
    }
}

/// Loose phone check: 7 to 20 characters of digits and common separators,
/// with at least 7 digits.
pub fn validate_phone(phone: &str) -> Result<(), AccountError> {
    let phone = phone.trim();
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
    if !allowed || digits < 7 || phone.len() > 20 {
        return Err(AccountError::invalid(
            "phone",
            "Please provide a valid phone number",
        ));
    }
    Ok(())
}

pub(crate) fn validate_max(
    field: &'static str,
    value: &str,
    max: usize,
    label: &str,
) -> Result<(), AccountError> {
    if value.trim().chars().count() > max {
        return Err(AccountError::invalid(
            field,
            format!("{label} cannot exceed {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_bounds() {
        assert!(validate_name("Al").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(
            normalize_email("  Jane.Doe@Example.COM ").unwrap(),
            "jane.doe@example.com"
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in ["", "plain", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@b.c"] {
            assert!(normalize_email(email).is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn password_rules_apply_in_order() {
        assert!(validate_password("password", "Str0ng!pw").is_ok());

        let err = validate_password("password", "Sh0rt!").unwrap_err();
        assert!(err.to_string().contains("at least 8"));

        let err = validate_password("password", "lowercase1!").unwrap_err();
        assert!(err.to_string().contains("uppercase"));

        let err = validate_password("password", "NoDigits!!").unwrap_err();
        assert!(err.to_string().contains("digit"));

        let err = validate_password("newPassword", "NoSpecial1").unwrap_err();
        assert!(err.to_string().contains("special"));
        assert_eq!(err.field(), "newPassword");
    }

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("+1 (555) 010-0100").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me maybe").is_err());
    }
}

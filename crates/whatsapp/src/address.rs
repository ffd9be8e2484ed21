//! Phone number → JID normalization.

use crate::error::{Error, Result};

/// Server part of a personal (non-group) JID.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Turn a caller-supplied target into `<digits>@s.whatsapp.net`.
///
/// Targets that already contain `@` are passed through untouched. Common
/// phone-number punctuation (`+`, spaces, dashes, dots, parentheses) is
/// stripped; anything else is rejected.
pub fn normalize_target(target: &str) -> Result<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::invalid("phone is required"));
    }
    if target.contains('@') {
        return Ok(target.to_string());
    }

    let mut digits = String::with_capacity(target.len());
    for ch in target.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            '+' | ' ' | '-' | '.' | '(' | ')' => {},
            other => {
                return Err(Error::invalid(format!(
                    "unexpected character {other:?} in phone number"
                )));
            },
        }
    }
    if digits.is_empty() {
        return Err(Error::invalid("phone number has no digits"));
    }
    Ok(format!("{digits}@{USER_SERVER}"))
}

/// The user part of a JID, without server or device suffix
/// (`5551234:3@s.whatsapp.net` → `5551234`).
pub fn user_part(jid: &str) -> &str {
    let user = jid.split_once('@').map_or(jid, |(user, _)| user);
    user.split_once(':').map_or(user, |(user, _)| user)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bare_number() {
        assert_eq!(
            normalize_target("5551234").unwrap(),
            "5551234@s.whatsapp.net"
        );
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(
            normalize_target(" +1 (555) 123-45.67 ").unwrap(),
            "15551234567@s.whatsapp.net"
        );
    }

    #[test]
    fn passes_through_jids() {
        assert_eq!(
            normalize_target("120363001234567890@g.us").unwrap(),
            "120363001234567890@g.us"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            normalize_target("call me"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(normalize_target("+ -"), Err(Error::InvalidRequest(_))));
        assert!(matches!(normalize_target("  "), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn user_part_strips_device() {
        assert_eq!(user_part("5551234:3@s.whatsapp.net"), "5551234");
        assert_eq!(user_part("5551234@s.whatsapp.net"), "5551234");
        assert_eq!(user_part("5551234"), "5551234");
    }
}

//! SASL credential encoding for AUTH PLAIN and AUTH LOGIN.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes a PLAIN initial response: `authzid NUL user NUL password`.
#[must_use]
pub fn plain_response(authzid: &str, username: &str, password: &str) -> String {
    let credentials = format!("{authzid}\0{username}\0{password}");
    STANDARD.encode(credentials.as_bytes())
}

/// Encodes one LOGIN answer (the username or the password).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response() {
        assert_eq!(
            plain_response("magma", "magma", "password"),
            "bWFnbWEAbWFnbWEAcGFzc3dvcmQ="
        );
        assert_eq!(
            plain_response("magma", "magma", "invalidpassword"),
            "bWFnbWEAbWFnbWEAaW52YWxpZHBhc3N3b3Jk"
        );
        assert_eq!(plain_response("", "user", "pass"), "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn test_login_response() {
        assert_eq!(login_response("magma"), "bWFnbWE=");
        assert_eq!(login_response("password"), "cGFzc3dvcmQ=");
        assert_eq!(login_response("invalidpassword"), "aW52YWxpZHBhc3N3b3Jk");
    }
}

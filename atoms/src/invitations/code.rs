//! Invitation code format.
//!
//! Codes are six characters from an alphabet without look-alikes (no O, I, L, 0, 1).
//! Older six-digit numeric codes are still accepted. The `INV-` prefix is for display
//! only and is never stored.

use crate::InvitationError;
use rand::Rng;

pub const CODE_LENGTH: usize = 6;
pub const SAFE_ALPHABET: &str = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const DISPLAY_PREFIX: &str = "INV-";

/// Canonical stored form of user input, or `InvalidCode`.
pub fn normalize_code(input: &str) -> Result<String, InvitationError> {
    let mut code: String = input
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    // 'I' is not in the alphabet, so a real code never starts with "INV".
    if let Some(rest) = code.strip_prefix("INV") {
        code = rest.to_string();
    }

    if code.is_empty() {
        return Err(InvitationError::InvalidCode("code is empty".to_string()));
    }
    let len = code.chars().count();
    if len != CODE_LENGTH {
        return Err(InvitationError::InvalidCode(format!(
            "expected {CODE_LENGTH} characters, got {len}"
        )));
    }
    if is_safe(&code) || is_legacy(&code) {
        Ok(code)
    } else {
        Err(InvitationError::InvalidCode(
            "only letters and digits excluding O, I, L, 0 and 1 are allowed".to_string(),
        ))
    }
}

pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let alphabet = SAFE_ALPHABET.as_bytes();
    (0..CODE_LENGTH)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// `INV-XXXXXX` for current codes; legacy numeric codes are shown bare.
pub fn display_code(code: &str) -> String {
    if is_legacy(code) {
        code.to_string()
    } else {
        format!("{DISPLAY_PREFIX}{code}")
    }
}

fn is_safe(code: &str) -> bool {
    code.chars().all(|c| SAFE_ALPHABET.contains(c))
}

fn is_legacy(code: &str) -> bool {
    code.chars().all(|c| c.is_ascii_digit())
}

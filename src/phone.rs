//! Phone number normalization
//!
//! Destinations and caller ids are normalized to a canonical `+`-prefixed
//! digit string before they reach the provider. Normalization is strict about
//! what it accepts and fails fast so a bad destination surfaces to the user
//! before any call is created.
//!
//! Normalizing an already-normalized number is a no-op:
//!
//! ```rust
//! use softphone_core::phone::normalize_number;
//!
//! let first = normalize_number("(202) 555-0123").unwrap();
//! assert_eq!(first, "+12025550123");
//! assert_eq!(normalize_number(&first).unwrap(), first);
//! ```

use crate::error::{ClientError, ClientResult};

/// Characters tolerated as visual separators in user-entered numbers
const SEPARATORS: &[char] = &[' ', '(', ')', '-', '.', '/'];

/// Normalize a phone number to canonical `+<country><national>` form
///
/// Accepted inputs:
/// - International form with a leading `+` and 8–15 digits
/// - Bare 10-digit national numbers, assumed North American (`+1` prefixed)
/// - 11-digit numbers with a leading `1` (North American with country code)
///
/// Visual separators (spaces, parentheses, dashes, dots) are stripped.
/// Anything else is rejected with [`ClientError::InvalidPhoneNumber`].
pub fn normalize_number(input: &str) -> ClientResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidPhoneNumber {
            input: input.to_string(),
            reason: "empty number".to_string(),
        });
    }

    let has_plus = trimmed.starts_with('+');
    let body: String = trimmed
        .trim_start_matches('+')
        .chars()
        .filter(|c| !SEPARATORS.contains(c))
        .collect();

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return Err(ClientError::InvalidPhoneNumber {
            input: input.to_string(),
            reason: "contains non-digit characters".to_string(),
        });
    }

    if has_plus {
        if body.len() < 8 || body.len() > 15 {
            return Err(ClientError::InvalidPhoneNumber {
                input: input.to_string(),
                reason: format!("expected 8-15 digits after '+', got {}", body.len()),
            });
        }
        return Ok(format!("+{}", body));
    }

    match body.len() {
        10 => Ok(format!("+1{}", body)),
        11 if body.starts_with('1') => Ok(format!("+{}", body)),
        n => Err(ClientError::InvalidPhoneNumber {
            input: input.to_string(),
            reason: format!("cannot infer country code for {}-digit number", n),
        }),
    }
}

//! Usage: Security-sensitive helpers (token masking and constant-time equality).

use subtle::ConstantTimeEq;

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

pub(crate) fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // Upstream values are not guaranteed ASCII; count and slice by characters.
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN {
        return "*".repeat(chars.len().min(8));
    }

    let prefix: String = chars[..TOKEN_MASK_PREFIX_LEN].iter().collect();
    let suffix: String = chars[chars.len() - TOKEN_MASK_SUFFIX_LEN..].iter().collect();
    format!("{prefix}...{suffix}")
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

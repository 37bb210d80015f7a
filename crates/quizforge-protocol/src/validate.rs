//! Input cleanup applied to client-supplied strings and coordinates.

/// Longest string kept after sanitizing.
const MAX_INPUT_CHARS: usize = 50;

/// Longest accepted player name.
const MAX_NAME_CHARS: usize = 20;

/// Trims, truncates to 50 characters, and strips markup-significant
/// characters (`<`, `>`, `"`, `'`, `&`).
pub fn sanitize_input(input: &str) -> String {
    input
        .trim()
        .chars()
        .take(MAX_INPUT_CHARS)
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .collect()
}

/// Returns `true` if `name` is 1–20 characters of letters, digits,
/// underscores, whitespace, or CJK ideographs.
pub fn is_valid_player_name(name: &str) -> bool {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return false;
    }
    name.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || c == '_'
            || c.is_whitespace()
            || ('\u{4e00}'..='\u{9fff}').contains(&c)
    })
}

/// Clamps a grid coordinate into `[0, 100]`. Non-finite input maps to 0.
pub fn clamp_coordinate(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

//! Small shared helpers.

pub mod timestamps;

pub use timestamps::{default_stack_name, iso_timestamp, stack_name_at};

/// Masks a secret for display, keeping the first and last two characters.
///
/// Values of four characters or fewer are shown as-is, matching how
/// short placeholders such as region names are usually printed.
#[must_use]
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return value.to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

//! Increment magnitude of write elements.

use crate::page::{Element, INCREMENT_ATTR};

/// Increment used when an element gives none, or an unreadable one.
pub const DEFAULT_INCREMENT: i64 = 1;

/// Returns the increment carried by the element's `marku-inc` attribute.
///
/// The value is read as a base-10 integer. Leading whitespace and an optional
/// sign are accepted, and parsing stops at the first non-digit, so `"3px"`
/// gives 3. A missing attribute, a value without leading digits, or a value
/// out of range gives [`DEFAULT_INCREMENT`].
///
/// The result depends only on the element's attributes, so calling it again
/// on the same element yields the same value.
///
/// # Examples
///
/// ```rust
/// use marku::increment::parse_increment;
/// use marku::page::memory::MemoryElement;
///
/// assert_eq!(parse_increment(&MemoryElement::new().with_attr("marku-inc", "3")), 3);
/// assert_eq!(parse_increment(&MemoryElement::new()), 1);
/// assert_eq!(parse_increment(&MemoryElement::new().with_attr("marku-inc", "abc")), 1);
/// ```
pub fn parse_increment(element: &dyn Element) -> i64 {
    element
        .attribute(INCREMENT_ATTR)
        .and_then(|value| parse_leading_int(&value))
        .unwrap_or(DEFAULT_INCREMENT)
}

fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => ("-", &trimmed[1..]),
        Some(b'+') => ("", &trimmed[1..]),
        _ => ("", trimmed),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    format!("{sign}{}", &rest[..digits]).parse().ok()
}

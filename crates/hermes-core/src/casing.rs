//! String case conversions used for endpoint naming.
//!
//! System and method identifiers on the wire are strictly lowercase
//! kebab-case; registration accepts the PascalCase names used in code and
//! converts them here.

use regex::Regex;
use std::sync::LazyLock;

static MATCH_FIRST_CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([A-Z])([A-Z][a-z])").expect("valid pattern"));
static MATCH_ALL_CAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").expect("valid pattern"));

/// Converts the provided string to kebab-case.
///
/// Acronym runs keep their grouping: `"HTTPServer"` becomes `"http-server"`,
/// not `"h-t-t-p-server"`.
///
/// # Example
///
/// ```
/// use hermes_core::to_kebab_case;
///
/// assert_eq!(to_kebab_case("CurrentTimeV1"), "current-time-v1");
/// assert_eq!(to_kebab_case("TestSystem"), "test-system");
/// ```
#[must_use]
pub fn to_kebab_case(input: &str) -> String {
    let output = MATCH_FIRST_CAP.replace_all(input, "${1}-${2}");
    let output = MATCH_ALL_CAP.replace_all(&output, "${1}-${2}");
    output.replace('_', "-").to_lowercase()
}

/// Converts the provided string to PascalCase.
///
/// The input is first normalized to kebab-case, then each word is
/// capitalized.
#[must_use]
pub fn to_pascal_case(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    to_kebab_case(input)
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

//! Header normalization
//!
//! Workbook headers are typed by people: "Competency*", "Trainer Name",
//! "TrainingTopics/ Material". Lookups happen on a canonical form instead:
//! trimmed, lowercased, with space, `/` and `,` turned into `_` and `*`
//! removed. Column order is never changed and unknown headers are kept.

/// Canonical form of a single header label
pub fn normalize_header(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' | '/' | ',' => Some('_'),
            '*' => None,
            other => Some(other),
        })
        .collect();

    // Removing a trailing '*' can expose whitespace that was inside it
    mapped.trim().to_string()
}

/// Canonical form of a header row, same length and order as the input
pub fn normalize_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter().map(|h| normalize_header(h.as_ref())).collect()
}

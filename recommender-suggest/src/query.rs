//! Normalization of the product query.

/// Split a comma separated product query into normalized product names.
///
/// Each segment is trimmed and lower-cased. Segments that are empty after
/// trimming are dropped, so a blank query yields no products at all.
pub fn parse_products(query: &str) -> Vec<String> {
    query
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// 🔑 Identifier derivation
//
// Every id is a pure function of source identifiers, so re-running the
// pipeline over the same file reproduces the same ids.

/// Company node id for a LEI
pub fn company_id(lei: &str) -> String {
    format!("lei-{}", lei)
}

/// Security node id for an ISIN
pub fn security_id(isin: &str) -> String {
    format!("lei-isin-{}", isin)
}

/// Succession edge id (both sides as raw LEIs)
pub fn succession_id(predecessor: &str, successor: &str) -> String {
    format!("lei-succession-{}-{}", predecessor, successor)
}

/// Relationship edge id: `lei-<start>-<slug(type)>-<end>`
pub fn relationship_id(start_lei: &str, relationship_type: &str, end_lei: &str) -> String {
    format!("lei-{}-{}-{}", start_lei, slugify(relationship_type), end_lei)
}

/// Lowercase, collapse every non-alphanumeric run to one `-`, trim dashes
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Keep the date part of an ISO-8601 date-time (`2022-05-18T00:00:00Z` → `2022-05-18`)
pub fn parse_date(text: Option<&str>) -> Option<String> {
    let date = text?.split('T').next()?.trim();
    if date.is_empty() {
        None
    } else {
        Some(date.to_string())
    }
}

//! Canonical collection-name derivation from record type names.
//!
//! A record type declared as `BlogPost` is bound to the `blog_post` collection
//! unless its settings supply an explicit override, which is used verbatim.

/// Converts a mixed/camel-case type name to a lowercase, underscore-segmented
/// collection name.
///
/// A segment boundary is inserted before an uppercase letter that follows a
/// lowercase letter or digit, and before the last capital of an acronym run
/// when it is followed by a lowercase letter, so the run stays joined:
/// `HTTPResponse` becomes `http_response`, `APIKey` becomes `api_key`.
/// Single-letter and all-caps names collapse to one lowercase token.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1);

            let after_lower_or_digit = prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            let closes_acronym_run =
                prev.is_some_and(char::is_uppercase) && next.is_some_and(|n| n.is_lowercase());

            if after_lower_or_digit || closes_acronym_run {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Resolves the collection name for a record type.
///
/// An explicit override is used verbatim; otherwise the name is derived from
/// the type name with [`camel_to_snake`].
pub fn resolve_collection_name(type_name: &str, explicit: Option<&str>) -> String {
    match explicit {
        Some(name) => name.to_string(),
        None => camel_to_snake(type_name),
    }
}

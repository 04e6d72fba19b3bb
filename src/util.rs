/// Expand a compact camel-cased contributor role key into capitalized
/// space-separated words for display, e.g. "primaryArtist" -> "Primary Artist".
pub fn expand_role_key(key: &str) -> String {
    let mut spaced = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_uppercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }
    spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the year component from an API date string like "2018-12-21".
/// Returns None if the string has no leading year.
pub fn release_year(date: &str) -> Option<String> {
    date.split('-')
        .next()
        .filter(|y| !y.is_empty())
        .map(|y| y.to_string())
}

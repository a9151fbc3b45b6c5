//! Naming helpers shared by the ORM and the dispatcher.
//!
//! Model names are CamelCase (`BlogPost`), tables and foreign keys are
//! under_scored (`blog_posts`, `blog_post_id`).

/// Converts `CamelCase` into `camel_case`.
///
/// An underscore is inserted before every uppercase letter that follows a
/// word character, then the whole string is lowercased.
pub fn underscore(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 4);
    let mut prev_is_word = false;
    for c in word.chars() {
        if c.is_uppercase() && prev_is_word {
            out.push('_');
        }
        out.extend(c.to_lowercase());
        prev_is_word = c.is_alphanumeric() || c == '_';
    }
    out
}

/// Converts `under_scored` words into `UnderScored`.
pub fn camelize(word: &str) -> String {
    word.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Makes `url` absolute by prefixing `full_base` unless it already carries
/// an `http:` or `https:` scheme.
pub fn full_url(full_base: &str, url: &str) -> String {
    let lower = url.get(..6).unwrap_or(url).to_ascii_lowercase();
    if lower.starts_with("http:") || lower.starts_with("https:") {
        return url.to_string();
    }
    format!("{}{}", full_base, url)
}

/// Uppercases the first character (`posts` → `Posts`).
pub fn ucfirst(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore() {
        assert_eq!(underscore("BlogPost"), "blog_post");
        assert_eq!(underscore("Post"), "post");
        assert_eq!(underscore("NameAndSurname"), "name_and_surname");
        assert_eq!(underscore("already_snake"), "already_snake");
    }

    #[test]
    fn test_camelize() {
        assert_eq!(camelize("blog_post"), "BlogPost");
        assert_eq!(camelize("post"), "Post");
        assert_eq!(camelize("_leading__double"), "LeadingDouble");
    }

    #[test]
    fn test_full_url() {
        assert_eq!(full_url("http://example.com", "/posts"), "http://example.com/posts");
        assert_eq!(full_url("http://example.com", "https://other.org/x"), "https://other.org/x");
        assert_eq!(full_url("http://example.com", "HTTP://up.case"), "HTTP://up.case");
    }
}

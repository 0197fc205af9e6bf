//! `Link` header parsing for paginated GitHub API responses.

/// Extract the `rel="next"` URL from a `Link` header value.
///
/// ```
/// use toolvm_tools_github::link::parse_next_link;
///
/// let header = r#"<https://api.github.com/repositories/1/tags?page=2>; rel="next", <https://api.github.com/repositories/1/tags?page=5>; rel="last""#;
/// assert_eq!(
///     parse_next_link(header).as_deref(),
///     Some("https://api.github.com/repositories/1/tags?page=2")
/// );
/// ```
#[must_use]
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut params = part.split(';');
        let url = params
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;
        let is_next = params.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .is_some_and(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
        });
        is_next.then(|| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_page_has_no_next() {
        let header = r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=1>; rel="first""#;
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn test_unquoted_and_combined_rel() {
        assert_eq!(
            parse_next_link("<https://a/b?page=3>; rel=next").as_deref(),
            Some("https://a/b?page=3")
        );
        assert_eq!(
            parse_next_link(r#"<https://a/b?page=3>; rel="next last""#).as_deref(),
            Some("https://a/b?page=3")
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_next_link(""), None);
        assert_eq!(parse_next_link("https://a/b; rel=\"next\""), None);
    }
}

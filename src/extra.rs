#[inline]
pub(crate) fn split_query(uri: &str) -> (String, &str) {
    uri.split_once('?')
        .map(|(b, q)| (b.to_owned(), q))
        .unwrap_or_else(|| (uri.to_owned(), ""))
}

/// Join two query strings, `first` taking precedence in ordering.
#[inline]
pub(crate) fn join_query(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_owned(),
        (_, true) => first.to_owned(),
        _ => format!("{first}&{second}"),
    }
}

/// Append a query string to a path or url.
#[inline]
pub(crate) fn with_query(mut uri: String, query: &str) -> String {
    if query.is_empty() {
        return uri;
    }
    match uri.contains('?') {
        true => uri.push('&'),
        false => uri.push('?'),
    }
    uri.push_str(query);
    uri
}

/// Split an absolute url into scheme, authority and path-and-query.
pub(crate) fn split_absolute(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    match rest.find(['/', '?']) {
        Some(index) => Some((scheme, &rest[..index], &rest[index..])),
        None => Some((scheme, rest, "")),
    }
}

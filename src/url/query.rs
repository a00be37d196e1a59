use url::Url;

/// Returns the first value of query parameter `name`, if present
///
/// # Examples
///
/// ```
/// use threadkeeper::url::query_param;
/// use url::Url;
///
/// let url = Url::parse("https://forum.example.com/viewforum.php?f=12&start=30").unwrap();
/// assert_eq!(query_param(&url, "start").as_deref(), Some("30"));
/// assert_eq!(query_param(&url, "t"), None);
/// ```
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Returns a copy of `url` with every occurrence of `name` removed
///
/// The relative order of the remaining parameters is preserved and an empty
/// query string is dropped entirely.
pub fn without_param(url: &Url, name: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    rebuild_query(url, &kept)
}

/// Returns a copy of `url` with `name` set to `value`, appended after the
/// remaining parameters
pub fn with_param(url: &Url, name: &str, value: &str) -> Url {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((name.to_string(), value.to_string()));

    rebuild_query(url, &pairs)
}

/// Checks whether two URLs address the same endpoint (scheme, host, port and path)
pub fn same_endpoint(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path() == b.path()
}

fn rebuild_query(url: &Url, pairs: &[(String, String)]) -> Url {
    let mut rebuilt = url.clone();
    if pairs.is_empty() {
        rebuilt.set_query(None);
    } else {
        rebuilt.query_pairs_mut().clear().extend_pairs(pairs);
    }
    rebuilt
}

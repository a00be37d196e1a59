use crate::url::query::without_param;
use url::Url;

/// Query parameters that carry per-visitor state rather than identity
const VOLATILE_PARAMS: &[&str] = &[
    "sid",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Derives the canonical URL of a topic link
///
/// # Canonicalization Steps
///
/// 1. Lowercase the host
/// 2. Remove the fragment (post anchors such as `#p1234`)
/// 3. Remove session ids (`sid`) and tracking parameters
/// 4. Keep every other parameter in its original order
///
/// # Examples
///
/// ```
/// use threadkeeper::url::canonical_topic_url;
/// use url::Url;
///
/// let raw = Url::parse("https://Forum.Example.com/viewtopic.php?f=2&t=77&sid=abc#p9").unwrap();
/// assert_eq!(
///     canonical_topic_url(&raw).as_str(),
///     "https://forum.example.com/viewtopic.php?f=2&t=77"
/// );
/// ```
pub fn canonical_topic_url(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            // Lowercasing a valid host cannot make it invalid
            let _ = canonical.set_host(Some(&lowered));
        }
    }

    if canonical.query().is_some() {
        for param in VOLATILE_PARAMS {
            canonical = without_param(&canonical, param);
        }
        let utm_keys: Vec<String> = canonical
            .query_pairs()
            .filter(|(key, _)| key.starts_with("utm_"))
            .map(|(key, _)| key.into_owned())
            .collect();
        for key in utm_keys {
            canonical = without_param(&canonical, &key);
        }
    }

    canonical
}

//! Fast URL slicing utilities
//!
//! These functions avoid allocations and work directly on string slices.
//! Page URLs arrive from `location.href`, so only absolute URLs are expected.

// =============================================================================
// Scheme / Host
// =============================================================================

/// Offset just past the `://` separator, if the URL has one.
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    url[colon + 1..].starts_with("//").then_some(colon + 3)
}

/// Byte range of the hostname, without userinfo or port.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let authority_start = get_scheme_end(url)?;
    let rest = &url[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_start = authority.rfind('@').map_or(0, |at| at + 1);
    let host_len = authority[host_start..]
        .find(':')
        .unwrap_or(authority.len() - host_start);

    Some((authority_start + host_start, authority_start + host_start + host_len))
}

/// Hostname as a slice of `url`.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (start, end) = get_host_position(url)?;
    Some(&url[start..end])
}

/// Lowercase a hostname and drop a leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let lower = host.trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Suffix match of `host` against a tracked `domain`, on a label boundary.
///
/// `m.youtube.com` matches `youtube.com`; `notyoutube.com` does not.
#[inline]
pub fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    if host.len() < domain.len() {
        return false;
    }
    let split = host.len() - domain.len();
    if !host.as_bytes()[split..].eq_ignore_ascii_case(domain.as_bytes()) {
        return false;
    }
    split == 0 || host.as_bytes()[split - 1] == b'.'
}

// =============================================================================
// Path / Query
// =============================================================================

/// Path of a URL, `/` when it has none.
#[inline]
pub fn extract_path(url: &str) -> &str {
    let Some(scheme_end) = get_scheme_end(url) else {
        return "/";
    };
    let rest = logical_page(&url[scheme_end..]);
    match rest.find('/') {
        Some(slash) => &rest[slash..],
        None => "/",
    }
}

/// Non-empty `/`-separated segments of a path.
#[inline]
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// The URL with query string and fragment removed.
///
/// Two URLs with the same logical page name the same piece of content even
/// when tracking parameters differ.
#[inline]
pub fn logical_page(url: &str) -> &str {
    let end = url
        .as_bytes()
        .iter()
        .position(|&b| b == b'?' || b == b'#')
        .unwrap_or(url.len());
    &url[..end]
}

/// Look up the first value of a query parameter. No percent-decoding beyond
/// what domain names need.
pub fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let q_pos = url.find('?')?;
    let query = &url[q_pos + 1..];
    let query = match query.find('#') {
        Some(hash_pos) => &query[..hash_pos],
        None => query,
    };

    query.split('&').find_map(|pair| match pair.split_once('=') {
        Some((k, v)) if k == key => Some(v),
        None if pair == key => Some(""),
        _ => None,
    })
}

/// Trailing path segment of a media source, without query or fragment.
///
/// Works for `blob:` URLs too, whose tail is an opaque per-video token.
pub fn last_segment(src: &str) -> Option<&str> {
    let src = logical_page(src);
    src.rsplit('/').find(|s| !s.is_empty() && !s.ends_with(':'))
}

//! Pure string helpers over S3 keys and prefixes
//!
//! Folders in S3 are simulated by keys with a trailing `/`, so everything in
//! here is plain string slicing along that separator.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything a browser's `encodeURIComponent` leaves verbatim
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Maximum displayed path length before shortening kicks in
const PATH_LIMIT: usize = 80;

/// Horizontal ellipsis used when collapsing long paths
const PATH_ELLIPSIS: char = '\u{2026}';

/// A key with a trailing separator denotes a folder
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Convert `cars/vw/golf.png` to `golf.png`
pub fn filename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Convert `cars/vw/golf.png` to `cars/vw/`; a bare filename maps to `/`
pub fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "/".to_string(),
    }
}

/// Convert `cars/vw/` to `vw/`
pub fn prefix_folder(prefix: &str) -> String {
    let parts: Vec<&str> = prefix.split('/').filter(|p| !p.is_empty()).collect();
    parts
        .last()
        .map(|last| format!("{}/", last))
        .unwrap_or_default()
}

/// Convert `cars/vw/sedans/` to `cars/vw/`
pub fn prefix_parent(prefix: &str) -> String {
    let mut parts: Vec<&str> = prefix.split('/').collect();
    if parts.len() >= 2 {
        parts.remove(parts.len() - 2);
    }
    parts.join("/")
}

/// Strip leading and trailing `/` runs
pub fn strip_slashes(s: &str) -> &str {
    s.trim_matches('/')
}

/// Shorten a long path for display, e.g. `cars/vw/golf.png` to `cars/…/golf.png`.
///
/// Tries collapsing to the parent folder first, then to the leading segment,
/// and finally truncates outright.
pub fn shorten(path: &str) -> String {
    if path.len() < PATH_LIMIT {
        return path.to_string();
    }

    let soft = format!(
        "{}{}/{}",
        prefix_parent(&parent_path(path)),
        PATH_ELLIPSIS,
        filename(path)
    );
    if soft.chars().count() < PATH_LIMIT && soft.chars().count() > 2 {
        return soft;
    }

    let head = path.find('/').map(|idx| &path[..=idx]).unwrap_or("");
    let hard = format!("{}{}/{}", head, PATH_ELLIPSIS, filename(path));
    if hard.chars().count() < PATH_LIMIT {
        hard
    } else {
        let truncated: String = path.chars().take(PATH_LIMIT).collect();
        format!("{}{}", truncated, PATH_ELLIPSIS)
    }
}

/// Virtual-hosted-style URL, e.g. `https://mybucket.s3.amazonaws.com/cars/golf.png`,
/// with each key segment percent-encoded.
///
/// Used for public object downloads when running anonymously.
pub fn virtual_host_url(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, URL_SEGMENT).to_string())
        .collect();
    format!("https://{}.s3.amazonaws.com/{}", bucket, encoded.join("/"))
}

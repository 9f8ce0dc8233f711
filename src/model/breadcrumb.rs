//! Breadcrumb trail derived from the bucket name and the current prefix

/// One clickable (or terminal) breadcrumb segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    /// Display label: bucket name or folder segment
    pub label: String,
    /// Prefix accumulated up to and including this segment; empty for the bucket
    pub prefix: String,
    /// The last segment is the current location and is not clickable
    pub navigable: bool,
}

/// Build the breadcrumb trail for `bucket` + `prefix`.
///
/// The first element is always the bucket itself with an empty prefix.
/// Navigating a breadcrumb feeds its `prefix` back into the view's
/// `change_view_prefix`.
pub fn build_breadcrumbs(bucket: &str, prefix: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        label: bucket.to_string(),
        prefix: String::new(),
        navigable: true,
    }];

    let trimmed = prefix.trim_end_matches('/');
    if !trimmed.is_empty() {
        let mut accumulated = String::new();
        for segment in trimmed.split('/') {
            accumulated.push_str(segment);
            accumulated.push('/');
            crumbs.push(Breadcrumb {
                label: segment.to_string(),
                prefix: accumulated.clone(),
                navigable: true,
            });
        }
    }

    if let Some(last) = crumbs.last_mut() {
        last.navigable = false;
    }
    crumbs
}

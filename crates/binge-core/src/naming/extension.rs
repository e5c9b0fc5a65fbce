//! File extension and stem hints taken from a source URL.

/// Returns the last non-empty path segment of `url`, ignoring query and fragment.
pub(crate) fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Extension of the URL's file name: three or four word characters after the
/// last dot, e.g. `mp4` for `https://cdn/x/ep01.mp4?token=abc`.
pub fn extension_from_url(url: &str) -> Option<String> {
    let segment = last_path_segment(url)?;
    let (_, ext) = segment.rsplit_once('.')?;
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if (3..=4).contains(&ext.len()) && ext.chars().all(is_word) {
        Some(ext.to_string())
    } else {
        None
    }
}

/// File name in the URL path without its extension.
pub(crate) fn stem_from_url(url: &str) -> Option<String> {
    let segment = last_path_segment(url)?;
    let stem = match (segment.rsplit_once('.'), extension_from_url(url)) {
        (Some((stem, _)), Some(_)) => stem.to_string(),
        _ => segment,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

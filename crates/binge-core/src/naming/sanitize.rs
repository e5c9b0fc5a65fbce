//! Filesystem-safe name components.

/// Characters rejected by at least one common filesystem.
const RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Longest component most filesystems accept, in bytes.
pub(super) const NAME_MAX: usize = 255;

/// Drops reserved and control characters, trims surrounding spaces and dots,
/// and caps the result at 255 bytes on a char boundary.
pub fn sanitize_component(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| !RESERVED.contains(c) && !c.is_control())
        .collect();
    let trimmed = kept.trim_matches(|c: char| c == '.' || c.is_whitespace());
    truncate(trimmed, NAME_MAX).to_string()
}

/// `name` cut to at most `max` bytes on a char boundary, trailing spaces dropped.
pub(super) fn truncate(name: &str, max: usize) -> &str {
    let mut end = name.len().min(max);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end()
}

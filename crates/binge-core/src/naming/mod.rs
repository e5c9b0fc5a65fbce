//! Destination file naming.
//!
//! Pure functions: a human-readable base name for an episode, and the final
//! on-disk file name combining that base with an extension from the URL.

mod extension;
mod sanitize;

pub use extension::extension_from_url;
pub use sanitize::sanitize_component;

use sanitize::{truncate, NAME_MAX};

/// Base name used when neither the caller nor the URL provides one.
const DEFAULT_STEM: &str = "download";

/// Room kept for a `.ext` of up to four characters after an episode name.
const EXTENSION_ROOM: usize = 5;

/// `"<title> - E<episode>"`, with the title made filesystem-safe and the
/// episode left-padded with zeros to two characters. A long title is cut so
/// the episode suffix and an extension still fit in one path component.
///
/// `episode_base_name("Frieren: Beyond", "3")` → `"Frieren Beyond - E03"`
pub fn episode_base_name(title: &str, episode: &str) -> String {
    let suffix = format!(" - E{:0>2}", sanitize_component(episode));
    let title = sanitize_component(title);
    let room = NAME_MAX.saturating_sub(suffix.len() + EXTENSION_ROOM);
    format!("{}{}", truncate(&title, room), suffix)
}

/// On-disk file name for a download of `source_url`.
///
/// The stem is `base_name` when given, otherwise the URL's file stem, otherwise
/// `"download"`. The extension comes from the URL, or `fallback_ext`.
pub fn file_name(source_url: &str, base_name: Option<&str>, fallback_ext: &str) -> String {
    let stem = base_name
        .map(sanitize_component)
        .filter(|s| !s.is_empty())
        .or_else(|| extension::stem_from_url(source_url).map(|s| sanitize_component(&s)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STEM.to_string());
    let ext = extension_from_url(source_url)
        .unwrap_or_else(|| fallback_ext.trim_start_matches('.').to_string());
    if ext.is_empty() {
        return stem;
    }
    let room = NAME_MAX.saturating_sub(ext.len() + 1).max(1);
    format!("{}.{}", truncate(&stem, room), ext)
}

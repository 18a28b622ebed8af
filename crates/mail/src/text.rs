//! Text normalization for previews and identifiers
//!
//! All functions are pure. Lengths are counted in characters (Unicode scalar
//! values), never in bytes.

/// Marker appended to text cut by [`truncate`] and [`shorten`]
pub const ELLIPSIS: &str = "...";

/// Texts longer than this are cut by [`shorten`]
pub const SHORTENED_MAX: usize = 60;

/// [`shorten`] falls back to a hard cut when a word-aware cut would leave
/// fewer characters than this
pub const SHORTENED_MIN: usize = 12;

/// Truncate text to at most `max_chars` characters.
///
/// A missing text becomes the empty string. Text that already fits is
/// returned unchanged. Otherwise the first `max_chars - 3` characters are
/// kept and [`ELLIPSIS`] appended when `with_ellipsis` is set, or exactly the
/// first `max_chars` characters are kept when it is not. The cut ignores word
/// boundaries.
///
/// # Panics
///
/// Panics if `max_chars` is below 4 with an ellipsis or below 1 without one.
pub fn truncate(text: Option<&str>, max_chars: usize, with_ellipsis: bool) -> String {
    assert!(
        max_chars >= 1 && (!with_ellipsis || max_chars >= 4),
        "max_chars must be at least 1 without an ellipsis or 4 with one, got {max_chars}"
    );

    let Some(text) = text else {
        return String::new();
    };

    // Only the char at the cut point matters, so avoid counting the whole text
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    if with_ellipsis {
        let keep = max_chars - ELLIPSIS.len();
        let end = text.char_indices().nth(keep).map_or(cut, |(i, _)| i);
        format!("{}{}", &text[..end], ELLIPSIS)
    } else {
        text[..cut].to_string()
    }
}

/// Turn text into a lowercase, hyphen-separated token usable in URLs.
///
/// ASCII letters and digits are kept (lowercased); every other run of
/// characters collapses into a single hyphen. Leading and trailing hyphens
/// are dropped, so text without any ASCII alphanumerics yields "".
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Word-aware short form of a text, used for titles derived from bodies.
///
/// Text of at most [`SHORTENED_MAX`] characters is returned as is. Longer
/// text is cut to that length and the trailing partial word dropped; if that
/// leaves fewer than [`SHORTENED_MIN`] characters the hard cut is used
/// instead. The result ends with [`ELLIPSIS`].
pub fn shorten(text: Option<&str>) -> Option<String> {
    let text = text?;
    let Some((cut, _)) = text.char_indices().nth(SHORTENED_MAX) else {
        return Some(text.to_string());
    };

    let hard = &text[..cut];
    let soft = hard
        .trim_end_matches(|c: char| !c.is_whitespace())
        .trim_end();
    let kept = if soft.chars().count() < SHORTENED_MIN {
        hard
    } else {
        soft
    };

    Some(format!("{kept}{ELLIPSIS}"))
}

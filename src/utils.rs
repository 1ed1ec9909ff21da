use url::Url;

/// Safely truncate a string, ensuring it is not cut in the middle of
/// multi-byte characters and that the display width stays within bounds.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + 3 > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str("...");
    result
}

/// Bare host of a URL, lowercased (`www.tiktok.com`).
pub fn host_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// Leading bytes of every zip local file header.
pub const ZIP_MAGIC: &[u8; 2] = b"PK";

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `"<artist> - <title>"` with both halves made safe for the filesystem.
pub fn song_display_name(artist: &str, title: &str) -> String {
    let name = format!("{} - {}", sanitize_filename(artist), sanitize_filename(title));
    name.trim_matches(|c| c == '.' || c == ' ').to_string()
}

pub fn has_archive_signature(payload: &[u8]) -> bool {
    payload.starts_with(ZIP_MAGIC)
}

/// True when a body looks like an HTML document rather than file content.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.contains("<html") || head.contains("<head")
}

/// Content types that carry the real file instead of a placeholder page.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("zip") || ct.contains("octet-stream") || ct.contains("x-sng")
}

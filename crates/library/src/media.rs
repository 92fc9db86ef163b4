use std::path::Path;

pub const POSTER_NAMES: &[&str] = &["poster.jpg", "artist.jpg", "cover.jpg", "album.jpg"];

pub const THUMBNAIL_SUFFIXES: &[&str] = &[
    "-thumb.jpg",
    "-thumb.webp",
    "-thumb.png",
    ".jpg",
    ".webp",
    ".png",
];

/// MIME type for a recognised audio file name, by extension.
pub fn audio_mime_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "aac" => Some("audio/aac"),
        "m4a" => Some("audio/mp4"),
        "opus" => Some("audio/opus"),
        _ => None,
    }
}

/// First conventional poster image inside `folder`.
pub fn find_poster(folder: &Path) -> Option<String> {
    POSTER_NAMES
        .iter()
        .find(|name| folder.join(name).is_file())
        .map(|name| name.to_string())
}

/// First thumbnail beside an audio file, relative to its directory.
pub fn find_thumbnail(dir: &Path, base_name: &str) -> Option<String> {
    THUMBNAIL_SUFFIXES
        .iter()
        .map(|suffix| format!("{}{}", base_name, suffix))
        .find(|candidate| dir.join(candidate).is_file())
}

/// File name without its final extension.
pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

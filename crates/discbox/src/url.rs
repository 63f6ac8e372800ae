//! Validation for submitted media-collection URLs.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::DiscboxError;

/// Hosts we accept collection URLs from.
const ALLOWED_HOSTS: &[&str] = &["music.youtube.com", "www.youtube.com", "youtube.com"];

// Pre-compiled patterns for album-shaped URLs
static RE_ALBUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(music\.youtube\.com/playlist\?list=OLAK5uy_|music\.youtube\.com/browse/MPREb_|(www\.)?youtube\.com/playlist\?list=)",
    )
    .unwrap()
});

/// Validates that a URL points to a collection (album or playlist) on an
/// allowed host. Rejection happens before a job is ever created.
pub fn validate_collection_url(url: &str) -> Result<(), DiscboxError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DiscboxError::InvalidUrl("URL is required".to_string()));
    }

    let host = match host_of(url) {
        Some(h) => h,
        None => return Err(DiscboxError::InvalidUrl("Invalid URL format".to_string())),
    };

    if !ALLOWED_HOSTS.contains(&host) {
        return Err(DiscboxError::InvalidUrl(
            "URL must be from YouTube or YouTube Music".to_string(),
        ));
    }

    let is_collection = url.contains("list=")
        || url.contains("/playlist")
        || url.contains("OLAK5uy_")
        || url.contains("RDCLAK5uy_")
        || url.contains("/browse/MPREb_");

    if !is_collection {
        return Err(DiscboxError::InvalidUrl(
            "URL must be a playlist or album URL".to_string(),
        ));
    }

    Ok(())
}

/// Returns true for URLs that match the album-release patterns (as opposed
/// to user playlists). Albums get full release-metadata tagging.
pub fn is_album_url(url: &str) -> bool {
    RE_ALBUM.is_match(url.trim())
}

/// Extracts the host portion of an http(s) URL, or `None` if the URL does
/// not have an http(s) scheme.
fn host_of(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..end];
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_album_urls() {
        validate_collection_url("https://music.youtube.com/playlist?list=OLAK5uy_abc123").unwrap();
        validate_collection_url("https://music.youtube.com/browse/MPREb_xyz").unwrap();
        validate_collection_url("https://www.youtube.com/playlist?list=PL123").unwrap();
    }

    #[test]
    fn test_accepts_playlist_urls() {
        validate_collection_url("https://music.youtube.com/playlist?list=RDCLAK5uy_123").unwrap();
        validate_collection_url("https://music.youtube.com/watch?v=abc&list=PL456").unwrap();
    }

    #[test]
    fn test_rejects_empty() {
        assert!(validate_collection_url("").is_err());
        assert!(validate_collection_url("   ").is_err());
    }

    #[test]
    fn test_rejects_wrong_host() {
        assert!(validate_collection_url("https://example.com/playlist?list=123").is_err());
        assert!(validate_collection_url("https://soundcloud.com/artist/sets/album").is_err());
    }

    #[test]
    fn test_rejects_non_collection() {
        assert!(validate_collection_url("https://music.youtube.com/watch?v=abc").is_err());
        assert!(validate_collection_url("https://www.youtube.com/").is_err());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(validate_collection_url("not a url").is_err());
        assert!(validate_collection_url("ftp://music.youtube.com/playlist?list=1").is_err());
        assert!(validate_collection_url("https://").is_err());
    }

    #[test]
    fn test_is_album_url() {
        assert!(is_album_url(
            "https://music.youtube.com/playlist?list=OLAK5uy_abc"
        ));
        assert!(is_album_url("https://music.youtube.com/browse/MPREb_xyz"));
        assert!(!is_album_url(
            "https://music.youtube.com/playlist?list=RDCLAK5uy_123"
        ));
    }
}

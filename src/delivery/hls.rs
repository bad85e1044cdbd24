//! HLS playlist inspection
//!
//! Just enough M3U8 handling to expose the rendition ladder: master
//! playlists are parsed for `#EXT-X-STREAM-INF` variants (height, bandwidth,
//! URI); media playlists are recognized and passed through untouched. The
//! heavy lifting of segment scheduling belongs to the player core.

use url::Url;

/// One variant stream from a master playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    /// Vertical resolution from the RESOLUTION attribute, when present
    pub height: Option<u32>,
    pub bandwidth: Option<u64>,
    /// Absolute URI of the variant's media playlist
    pub uri: String,
}

/// Whether the playlist text is a master (multi-variant) playlist
pub fn is_master_playlist(playlist: &str) -> bool {
    playlist
        .lines()
        .any(|l| l.starts_with("#EXT-X-STREAM-INF"))
}

/// Parse the variant ladder out of a master playlist.
///
/// Relative variant URIs are resolved against `base_url`. Returns an empty
/// list for media playlists.
pub fn parse_master_playlist(playlist: &str, base_url: &str) -> Vec<VariantStream> {
    let mut variants = Vec::new();
    let mut lines = playlist.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.starts_with("#EXT-X-STREAM-INF") {
            continue;
        }

        let height = attr_value(line, "RESOLUTION")
            .and_then(|res| res.split('x').nth(1).map(str::to_string))
            .and_then(|h| h.parse().ok());
        let bandwidth = attr_value(line, "BANDWIDTH").and_then(|b| b.parse().ok());

        // The variant URI is the next non-comment line
        let uri = lines
            .by_ref()
            .find(|l| !l.trim().is_empty() && !l.starts_with('#'));
        if let Some(uri) = uri {
            variants.push(VariantStream {
                height,
                bandwidth,
                uri: resolve_uri(base_url, uri.trim()),
            });
        }
    }

    variants
}

/// Distinct rendition heights present in the ladder, descending
pub fn rendition_heights(variants: &[VariantStream]) -> Vec<u32> {
    let mut heights: Vec<u32> = variants.iter().filter_map(|v| v.height).collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    heights
}

/// Extract an attribute value from an EXT-X tag line.
///
/// Handles both quoted and bare values; stops at the next comma for bare
/// values so `RESOLUTION=1920x1080,CODECS=...` parses cleanly. The name must
/// sit at an attribute boundary, so `BANDWIDTH` never matches inside
/// `AVERAGE-BANDWIDTH`.
fn attr_value(line: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let mut from = 0;
    let start = loop {
        let idx = line[from..].find(&needle)? + from;
        let at_boundary = idx == 0 || matches!(line.as_bytes()[idx - 1], b':' | b',');
        if at_boundary {
            break idx + needle.len();
        }
        from = idx + needle.len();
    };
    let rest = &line[start..];
    if let Some(stripped) = rest.strip_prefix('"') {
        stripped.split('"').next().map(str::to_string)
    } else {
        rest.split(',').next().map(str::to_string)
    }
}

/// Resolve a possibly-relative playlist URI against the manifest URL
fn resolve_uri(base_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }
    match Url::parse(base_url).and_then(|b| b.join(uri)) {
        Ok(joined) => joined.to_string(),
        Err(_) => uri.to_string(),
    }
}

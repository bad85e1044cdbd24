//! SRT and WebVTT parsing into a flat, time-ordered cue list

use crate::models::CaptionCue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Body is not recognizable subtitle text (commonly an HTML error page
    /// served in place of the file)
    #[error("body is not SRT or WebVTT subtitle text")]
    NotSubtitleText,
    #[error("no cues found in subtitle body")]
    Empty,
}

/// Parse a subtitle body, auto-detecting SRT vs WebVTT.
///
/// Returns cues sorted by start time. Fails rather than yielding an empty
/// track so callers can fall back to another fetch path.
pub fn parse_cues(body: &str) -> Result<Vec<CaptionCue>, ParseError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();

    if looks_like_html(trimmed) {
        return Err(ParseError::NotSubtitleText);
    }

    let mut cues = if trimmed.starts_with("WEBVTT") {
        parse_blocks(trimmed, true)
    } else {
        parse_blocks(trimmed, false)
    };

    if cues.is_empty() {
        return Err(ParseError::Empty);
    }
    cues.sort_by(|a, b| {
        a.start_seconds
            .partial_cmp(&b.start_seconds)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(cues)
}

/// All cues active at the given playback time, in track order
pub fn active_cues_at(cues: &[CaptionCue], time_seconds: f64) -> Vec<&CaptionCue> {
    cues.iter().filter(|c| c.contains(time_seconds)).collect()
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.get(..256.min(body.len())).unwrap_or("").to_lowercase();
    lower.starts_with("<!doctype") || lower.starts_with("<html") || lower.starts_with("<?xml")
}

/// Walk blank-line-separated blocks; a block contributes a cue when one of
/// its lines is a `start --> end` timing line.
fn parse_blocks(body: &str, vtt: bool) -> Vec<CaptionCue> {
    let mut cues = Vec::new();

    for block in body.split("\n\n").flat_map(|b| b.split("\r\n\r\n")) {
        let lines: Vec<&str> = block.lines().map(str::trim_end).collect();
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let Some((start, end)) = parse_timing_line(lines[timing_idx]) else {
            continue;
        };

        let text = lines[timing_idx + 1..]
            .iter()
            .filter(|l| !l.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            continue;
        }

        cues.push(CaptionCue {
            start_seconds: start,
            end_seconds: end,
            text: if vtt { text } else { strip_srt_markup(&text) },
        });
    }

    cues
}

fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let mut parts = line.split("-->");
    let start = parse_timestamp(parts.next()?.trim())?;
    // VTT timing lines may carry cue settings after the end timestamp
    let end_part = parts.next()?.trim();
    let end_token = end_part.split_whitespace().next()?;
    let end = parse_timestamp(end_token)?;
    (end > start).then_some((start, end))
}

/// `HH:MM:SS,mmm` (SRT), `HH:MM:SS.mmm` and `MM:SS.mmm` (VTT)
fn parse_timestamp(ts: &str) -> Option<f64> {
    let normalized = ts.replace(',', ".");
    let mut fields: Vec<&str> = normalized.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return None;
    }

    let seconds_field = fields.pop()?;
    let secs: f64 = seconds_field.parse().ok()?;
    let minutes: f64 = fields.pop()?.parse().ok()?;
    let hours: f64 = match fields.pop() {
        Some(h) => h.parse().ok()?,
        None => 0.0,
    };

    Some(hours * 3600.0 + minutes * 60.0 + secs)
}

fn strip_srt_markup(text: &str) -> String {
    // SRT bodies occasionally carry {\an8}-style positioning tags
    let mut out = String::with_capacity(text.len());
    let mut in_brace = false;
    for ch in text.chars() {
        match ch {
            '{' => in_brace = true,
            '}' => in_brace = false,
            c if !in_brace => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:03,500\nFirst line\n\n2\n00:00:04,000 --> 00:00:06,000\nSecond line\nwith continuation\n";

    const VTT: &str = "WEBVTT\n\n00:01.000 --> 00:03.500\nFirst line\n\n00:00:04.000 --> 00:00:06.000 align:center\nSecond line\n";

    #[test]
    fn test_parse_srt() {
        let cues = parse_cues(SRT).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_seconds, 1.0);
        assert_eq!(cues[0].end_seconds, 3.5);
        assert_eq!(cues[1].text, "Second line\nwith continuation");
    }

    #[test]
    fn test_parse_vtt_with_settings() {
        let cues = parse_cues(VTT).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_seconds, 1.0);
        assert_eq!(cues[1].end_seconds, 6.0);
    }

    #[test]
    fn test_html_body_rejected() {
        let err = parse_cues("<!DOCTYPE html><html><body>404</body></html>");
        assert!(matches!(err, Err(ParseError::NotSubtitleText)));
    }

    #[test]
    fn test_empty_body_rejected() {
        assert!(matches!(parse_cues("WEBVTT\n"), Err(ParseError::Empty)));
    }

    #[test]
    fn test_cues_sorted_by_start() {
        let body = "1\n00:00:10,000 --> 00:00:12,000\nLater\n\n2\n00:00:01,000 --> 00:00:02,000\nEarlier\n";
        let cues = parse_cues(body).unwrap();
        assert_eq!(cues[0].text, "Earlier");
        assert_eq!(cues[1].text, "Later");
    }

    #[test]
    fn test_active_cues_half_open_interval() {
        let cues = parse_cues(SRT).unwrap();
        assert_eq!(active_cues_at(&cues, 1.0).len(), 1);
        assert_eq!(active_cues_at(&cues, 3.5).len(), 0);
        assert_eq!(active_cues_at(&cues, 5.0)[0].text, "Second line\nwith continuation");
    }

    #[test]
    fn test_positioning_tags_stripped() {
        let body = "1\n00:00:01,000 --> 00:00:02,000\n{\\an8}Top text\n";
        let cues = parse_cues(body).unwrap();
        assert_eq!(cues[0].text, "Top text");
    }

    #[test]
    fn test_bom_tolerated() {
        let body = "\u{feff}WEBVTT\n\n00:01.000 --> 00:02.000\nHello\n";
        assert_eq!(parse_cues(body).unwrap().len(), 1);
    }
}

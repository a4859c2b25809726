use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, VidUtilsError};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Windows-1252 characters for bytes 0x80..=0x9F. Unassigned bytes keep their
/// C1 code point.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{81}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{8D}', '\u{017D}', '\u{8F}',
    '\u{90}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{9D}', '\u{017E}', '\u{0178}',
];

/// Text subtitle formats ffmpeg can write when extracting a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Ass,
    Ssa,
    WebVtt,
}

impl SubtitleFormat {
    /// Encoder name passed to `-c:s`
    pub fn codec(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Ssa => "ssa",
            SubtitleFormat::WebVtt => "webvtt",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Ass => "ass",
            SubtitleFormat::Ssa => "ssa",
            SubtitleFormat::WebVtt => "vtt",
        }
    }
}

impl FromStr for SubtitleFormat {
    type Err = VidUtilsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "srt" | "subrip" => Ok(SubtitleFormat::Srt),
            "ass" => Ok(SubtitleFormat::Ass),
            "ssa" => Ok(SubtitleFormat::Ssa),
            "vtt" | "webvtt" => Ok(SubtitleFormat::WebVtt),
            other => Err(VidUtilsError::UnsupportedFormat(format!(
                "subtitle format '{}' (valid: srt, ass, ssa, vtt)",
                other
            ))),
        }
    }
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Subtitle file sharing the video's stem, e.g. `movie.srt` for `movie.mkv`.
pub fn find_sibling_subtitle<P: AsRef<Path>>(video_path: P) -> Option<PathBuf> {
    let candidate = video_path.as_ref().with_extension("srt");
    candidate.is_file().then_some(candidate)
}

/// Rewrite a subtitle file as BOM-less UTF-8.
///
/// Files that are not valid UTF-8 are read as Windows-1252 (Latin-1 plus
/// typographic quotes and dashes in 0x80..=0x9F), the usual
/// encoding of subtitles downloaded alongside western releases. Returns
/// whether the file was rewritten.
pub async fn normalize_encoding<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    let raw = fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => VidUtilsError::FileNotFound(path.display().to_string()),
        _ => VidUtilsError::Io(e),
    })?;

    let Some(content) = transcode_to_utf8(&raw) else {
        debug!("Subtitle already UTF-8: {}", path.display());
        return Ok(false);
    };

    fs::write(path, content).await?;
    info!("Re-encoded subtitle as UTF-8: {}", path.display());
    Ok(true)
}

/// `None` when the bytes are already BOM-less UTF-8.
fn transcode_to_utf8(raw: &[u8]) -> Option<String> {
    if let Some(rest) = raw.strip_prefix(UTF8_BOM) {
        return Some(String::from_utf8_lossy(rest).into_owned());
    }
    match std::str::from_utf8(raw) {
        Ok(_) => None,
        Err(_) => Some(raw.iter().map(|&b| decode_cp1252(b)).collect()),
    }
}

fn decode_cp1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("SRT".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Srt);
        assert_eq!(".vtt".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::WebVtt);
        assert_eq!(SubtitleFormat::WebVtt.codec(), "webvtt");
        assert!(matches!(
            "pgs".parse::<SubtitleFormat>(),
            Err(VidUtilsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_transcode() {
        assert_eq!(transcode_to_utf8("olá".as_bytes()), None);
        assert_eq!(transcode_to_utf8(b"\xEF\xBB\xBFhi").as_deref(), Some("hi"));
        assert_eq!(transcode_to_utf8(b"ol\xE1").as_deref(), Some("olá"));
    }

    #[test]
    fn test_transcode_windows_1252_punctuation() {
        assert_eq!(
            transcode_to_utf8(b"\x93Ol\xE1\x94 \x96 it\x92s \x80").as_deref(),
            Some("\u{201C}Olá\u{201D} \u{2013} it\u{2019}s \u{20AC}")
        );
    }

    #[tokio::test]
    async fn test_normalize_rewrites_latin1_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.srt");
        std::fs::write(&path, b"1\n00:00:01,000 --> 00:00:02,000\nA\xE7\xE3o\n").unwrap();

        assert!(normalize_encoding(&path).await.unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Ação"));

        assert!(!normalize_encoding(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_normalize_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = normalize_encoding(dir.path().join("nope.srt")).await;
        assert!(matches!(result, Err(VidUtilsError::FileNotFound(_))));
    }

    #[test]
    fn test_find_sibling_subtitle() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        assert_eq!(find_sibling_subtitle(&video), None);

        std::fs::write(dir.path().join("movie.srt"), "1\n").unwrap();
        assert_eq!(find_sibling_subtitle(&video), Some(dir.path().join("movie.srt")));
    }
}

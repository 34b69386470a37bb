//! Encoding and delimiter detection from the head of a file.

use crate::utils::DecimalSeparator;
use encoding_rs::{UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

/// Bytes examined when sniffing encoding and delimiter.
pub const SNIFF_BYTES: usize = 64 * 1024;

/// Lines examined when scoring delimiters.
const SNIFF_LINES: usize = 20;

/// Detected text encoding of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Utf8,
    /// UTF-8 with a leading byte order mark
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    /// Single-byte fallback, decoded with the Windows-1252 table
    Latin1,
}

impl Encoding {
    /// The `encoding_rs` codec used to decode this input.
    pub fn codec(self) -> &'static encoding_rs::Encoding {
        match self {
            Self::Utf8 | Self::Utf8Bom => UTF_8,
            Self::Utf16Le => UTF_16LE,
            Self::Utf16Be => UTF_16BE,
            Self::Latin1 => WINDOWS_1252,
        }
    }
}

/// Field delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Comma delimiter (,)
    Comma,
    /// Tab delimiter (\t)
    Tab,
    /// Semicolon delimiter (;)
    Semicolon,
    /// Pipe delimiter (|)
    Pipe,
}

impl Delimiter {
    const ALL: [Delimiter; 4] = [Self::Comma, Self::Semicolon, Self::Tab, Self::Pipe];

    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Pipe => b'|',
        }
    }

    /// Decimal separator conventionally paired with this delimiter.
    pub fn decimal_separator(self) -> DecimalSeparator {
        match self {
            Delimiter::Semicolon => DecimalSeparator::Comma,
            Delimiter::Comma | Delimiter::Tab | Delimiter::Pipe => DecimalSeparator::Point,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Delimiter::Comma => ",",
            Delimiter::Tab => "\\t",
            Delimiter::Semicolon => ";",
            Delimiter::Pipe => "|",
        }
    }
}

/// Detect the encoding from a byte prefix.
///
/// BOMs win. Otherwise the prefix must be valid UTF-8, tolerating a
/// multi-byte sequence cut off at the end of the sample; anything else is
/// treated as Latin-1.
pub fn detect_encoding(head: &[u8]) -> Encoding {
    if let Some((codec, _)) = encoding_rs::Encoding::for_bom(head) {
        return if codec == UTF_8 {
            Encoding::Utf8Bom
        } else if codec == UTF_16LE {
            Encoding::Utf16Le
        } else {
            Encoding::Utf16Be
        };
    }
    match std::str::from_utf8(head) {
        Ok(_) => Encoding::Utf8,
        Err(e) if e.error_len().is_none() => Encoding::Utf8,
        Err(_) => Encoding::Latin1,
    }
}

/// Pick the delimiter whose per-line field count is most consistent.
///
/// Quoted sections are skipped when counting. Ties prefer the order
/// comma, semicolon, tab, pipe. Defaults to comma.
pub fn detect_delimiter(text: &str) -> Delimiter {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if lines.is_empty() {
        return Delimiter::Comma;
    }

    let mut scores: HashMap<Delimiter, usize> = HashMap::new();
    for delimiter in Delimiter::ALL {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, delimiter.as_byte() as char))
            .collect();
        let min_count = counts.iter().copied().min().unwrap_or(0);
        let max_count = counts.iter().copied().max().unwrap_or(0);
        if min_count == 0 {
            continue;
        }
        let consistency = if max_count == min_count {
            100
        } else if max_count - min_count <= 1 {
            50
        } else {
            10
        };
        scores.insert(delimiter, min_count * consistency);
    }

    let best = scores.values().copied().max().unwrap_or(0);
    Delimiter::ALL
        .into_iter()
        .find(|d| best > 0 && scores.get(d) == Some(&best))
        .unwrap_or(Delimiter::Comma)
}

fn count_unquoted(line: &str, delimiter: char) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Decode a sniffed prefix to text for delimiter detection.
pub fn decode_head(head: &[u8], encoding: Encoding) -> String {
    let (text, _) = encoding.codec().decode_with_bom_removal(head);
    text.into_owned()
}

/// Wrap `inner` so it yields UTF-8 whatever the detected encoding.
///
/// A leading BOM is consumed by the decoder; malformed sequences become
/// U+FFFD.
pub fn transcode<R: Read>(inner: R, encoding: Encoding) -> DecodeReaderBytes<R, Vec<u8>> {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding.codec()))
        .bom_sniffing(true)
        .utf8_passthru(false)
        .build(inner)
}

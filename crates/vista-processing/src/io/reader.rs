//! Chunked CSV reader producing a string-typed DataFrame.

use super::sniff::{
    Delimiter, Encoding, SNIFF_BYTES, decode_head, detect_delimiter, detect_encoding, transcode,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::CancellationToken;
use crate::utils::is_null_marker;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

/// What the reader found out about the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub encoding: Encoding,
    pub delimiter: Delimiter,
    pub rows_read: usize,
    pub chunks: usize,
    /// Rows were left unread because of the sample size cap.
    pub truncated: bool,
}

/// Reader settings.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub chunk_size: usize,
    pub sample_size: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            sample_size: None,
        }
    }
}

/// Reads delimited files in bounded chunks.
///
/// Every column comes back as a nullable `String` column; typing is left to
/// schema inference. Empty cells and null markers become nulls, and ragged
/// rows are padded or truncated to the header width.
pub struct CsvLoader<'a> {
    options: ReadOptions,
    token: &'a CancellationToken,
}

impl<'a> CsvLoader<'a> {
    pub fn new(options: ReadOptions, token: &'a CancellationToken) -> Self {
        Self { options, token }
    }

    /// Read `path`, calling `on_chunk(chunk_index, rows_so_far)` after each
    /// chunk.
    pub fn read_path(
        &self,
        path: &Path,
        on_chunk: &dyn Fn(usize, usize),
    ) -> Result<(DataFrame, SourceInfo)> {
        let mut file = File::open(path).map_err(|e| {
            PipelineError::DataRead(format!("cannot open {}: {}", path.display(), e))
        })?;

        let mut head = Vec::with_capacity(SNIFF_BYTES);
        (&mut file)
            .take(SNIFF_BYTES as u64)
            .read_to_end(&mut head)
            .map_err(|e| PipelineError::DataRead(format!("cannot read {}: {}", path.display(), e)))?;
        if head.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::DataRead(format!("{} is empty", path.display())));
        }

        let encoding = detect_encoding(&head);
        let delimiter = detect_delimiter(&decode_head(&head, encoding));
        info!(
            "Reading {} (encoding: {:?}, delimiter: '{}')",
            path.display(),
            encoding,
            delimiter.as_str()
        );

        file.seek(SeekFrom::Start(0))?;
        let source = transcode(BufReader::new(file), encoding);
        self.read_records(source, encoding, delimiter, on_chunk)
    }

    /// Read from an in-memory buffer, sniffing like [`read_path`](Self::read_path).
    pub fn read_bytes(
        &self,
        bytes: &[u8],
        on_chunk: &dyn Fn(usize, usize),
    ) -> Result<(DataFrame, SourceInfo)> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::DataRead("input is empty".to_string()));
        }
        let head = &bytes[..bytes.len().min(SNIFF_BYTES)];
        let encoding = detect_encoding(head);
        let delimiter = detect_delimiter(&decode_head(head, encoding));
        self.read_records(transcode(bytes, encoding), encoding, delimiter, on_chunk)
    }

    fn read_records<R: Read>(
        &self,
        source: R,
        encoding: Encoding,
        delimiter: Delimiter,
        on_chunk: &dyn Fn(usize, usize),
    ) -> Result<(DataFrame, SourceInfo)> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .flexible(true)
            .has_headers(true)
            .from_reader(source);

        let headers = unique_headers(reader.headers()?.iter());
        if headers.is_empty() {
            return Err(PipelineError::DataRead("no header row".to_string()));
        }

        let chunk_size = self.options.chunk_size.max(1);
        let limit = self.options.sample_size.unwrap_or(usize::MAX);
        let mut frame: Option<DataFrame> = None;
        let mut buffers: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(chunk_size); headers.len()];
        let mut rows_read = 0;
        let mut chunks = 0;
        let mut truncated = false;
        let mut record = csv::StringRecord::new();

        loop {
            if rows_read >= limit {
                truncated = reader.read_record(&mut record)?;
                break;
            }
            if !reader.read_record(&mut record)? {
                break;
            }
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            for (i, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(record.get(i).filter(|v| !is_null_marker(v)).map(|v| v.trim().to_string()));
            }
            rows_read += 1;

            if buffers[0].len() >= chunk_size {
                append_chunk(&mut frame, &headers, &mut buffers)?;
                chunks += 1;
                on_chunk(chunks, rows_read);
                if self.token.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
            }
        }

        if !buffers[0].is_empty() {
            append_chunk(&mut frame, &headers, &mut buffers)?;
            chunks += 1;
            on_chunk(chunks, rows_read);
        }

        let Some(mut df) = frame else {
            return Err(PipelineError::DataRead("no data rows after the header".to_string()));
        };
        df.rechunk_mut();
        debug!("Read {} rows in {} chunks", rows_read, chunks);

        Ok((
            df,
            SourceInfo {
                encoding,
                delimiter,
                rows_read,
                chunks,
                truncated,
            },
        ))
    }
}

fn append_chunk(
    frame: &mut Option<DataFrame>,
    headers: &[String],
    buffers: &mut [Vec<Option<String>>],
) -> Result<()> {
    let columns: Vec<Column> = headers
        .iter()
        .zip(buffers.iter_mut())
        .map(|(name, values)| {
            Series::new(name.as_str().into(), std::mem::take(values)).into_column()
        })
        .collect();
    let chunk = DataFrame::new(columns)?;
    match frame {
        Some(df) => {
            df.vstack_mut(&chunk)?;
        }
        None => *frame = Some(chunk),
    }
    Ok(())
}

/// Trimmed header names; blanks become `column_N`, repeats get `_2`, `_3`...
fn unique_headers<'r>(raw: impl Iterator<Item = &'r str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    raw.enumerate()
        .map(|(i, name)| {
            let base = match name.trim() {
                "" => format!("column_{}", i + 1),
                trimmed => trimmed.to_string(),
            };
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn read(bytes: &[u8], options: ReadOptions) -> Result<(DataFrame, SourceInfo)> {
        let token = CancellationToken::new();
        CsvLoader::new(options, &token).read_bytes(bytes, &|_, _| {})
    }

    #[test]
    fn test_reads_semicolon_file_with_nulls() {
        let (df, info) = read(
            b"date;region;revenue\n2024-01-01;North;10\n2024-01-02;NA;\n",
            ReadOptions::default(),
        )
        .unwrap();
        assert_eq!(info.delimiter, Delimiter::Semicolon);
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("region").unwrap().null_count(), 1);
        assert_eq!(df.column("revenue").unwrap().null_count(), 1);
    }

    #[test]
    fn test_chunks_do_not_split_rows() {
        let mut text = String::from("a,b\n");
        for i in 0..25 {
            text.push_str(&format!("{i},\"x,{i}\"\n"));
        }
        let calls = AtomicUsize::new(0);
        let token = CancellationToken::new();
        let options = ReadOptions {
            chunk_size: 10,
            sample_size: None,
        };
        let (df, info) = CsvLoader::new(options, &token)
            .read_bytes(text.as_bytes(), &|_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(info.chunks, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(df.height(), 25);
        let b = df.column("b").unwrap().as_materialized_series().clone();
        assert_eq!(b.str().unwrap().get(24), Some("x,24"));
    }

    #[test]
    fn test_sample_size_caps_rows() {
        let (df, info) = read(
            b"a\n1\n2\n3\n4\n",
            ReadOptions {
                chunk_size: 10,
                sample_size: Some(2),
            },
        )
        .unwrap();
        assert_eq!(df.height(), 2);
        assert!(info.truncated);
    }

    #[test]
    fn test_ragged_rows_padded() {
        let (df, _) = read(b"a,b,c\n1,2\n3,4,5,6\n", ReadOptions::default()).unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("c").unwrap().null_count(), 1);
    }

    #[test]
    fn test_empty_and_header_only_fail() {
        let err = read(b"", ReadOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "DATA_READ_ERROR");
        let err = read(b"a,b\n", ReadOptions::default()).unwrap_err();
        assert_eq!(err.error_code(), "DATA_READ_ERROR");
    }

    #[test]
    fn test_missing_file_is_data_read_error() {
        let token = CancellationToken::new();
        let err = CsvLoader::new(ReadOptions::default(), &token)
            .read_path(Path::new("/definitely/not/here.csv"), &|_, _| {})
            .unwrap_err();
        assert_eq!(err.error_code(), "DATA_READ_ERROR");
    }

    #[test]
    fn test_cancellation_between_chunks() {
        let token = CancellationToken::new();
        token.cancel();
        let options = ReadOptions {
            chunk_size: 1,
            sample_size: None,
        };
        let err = CsvLoader::new(options, &token)
            .read_bytes(b"a\n1\n2\n", &|_, _| {})
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_headers_deduplicated() {
        assert_eq!(
            unique_headers(["id", "", "id", " name "].into_iter()),
            vec!["id", "column_2", "id_2", "name"]
        );
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let (df, info) = read(b"\xEF\xBB\xBFname,v\nx,1\n", ReadOptions::default()).unwrap();
        assert_eq!(info.encoding, Encoding::Utf8Bom);
        assert!(df.column("name").is_ok());
    }

    #[test]
    fn test_windows_1252_values_decoded() {
        let (df, info) = read(b"name;price
caf\xe9;\x80 3
", ReadOptions::default()).unwrap();
        assert_eq!(info.encoding, Encoding::Latin1);
        let name = df.column("name").unwrap().as_materialized_series().clone();
        assert_eq!(name.str().unwrap().get(0), Some("caf\u{e9}"));
        let price = df.column("price").unwrap().as_materialized_series().clone();
        assert_eq!(price.str().unwrap().get(0), Some("\u{20ac} 3"));
    }
}

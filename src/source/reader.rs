use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chunked line reader over a log file.
///
/// Transparently decompresses when the path ends with `.gz`. Lines are
/// decoded lossily: invalid UTF-8 is replaced and never aborts the stream.
/// Memory stays bounded by `chunk_lines` regardless of file size.
pub struct ChunkReader {
    inner: BufReader<Box<dyn Read + Send>>,
    chunk_lines: usize,
    done: bool,
}

impl ChunkReader {
    pub fn open<P: AsRef<Path>>(path: P, chunk_lines: usize) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let source: Box<dyn Read + Send> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Ok(Self {
            inner: BufReader::new(source),
            chunk_lines: chunk_lines.max(1),
            done: false,
        })
    }

    /// Read the next chunk of up to `chunk_lines` lines, without trailing
    /// newlines. Returns `None` once the stream is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<String>>, ReaderError> {
        if self.done {
            return Ok(None);
        }

        let mut chunk = Vec::with_capacity(self.chunk_lines);
        let mut buf = Vec::new();

        while chunk.len() < self.chunk_lines {
            buf.clear();
            let bytes_read = self.inner.read_until(b'\n', &mut buf)?;
            if bytes_read == 0 {
                self.done = true;
                break;
            }

            // Strip the line terminator; \r is handled by the sanitizer.
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }

            chunk.push(String::from_utf8_lossy(&buf).into_owned());
        }

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

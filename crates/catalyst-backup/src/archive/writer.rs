//! Streaming archive writer.
//!
//! Entries are written in the order presented and each one is compressed on its
//! own. Entry bodies are streamed through the ZIP encoder into the sink as they
//! are produced; only the central directory is held back until [`ArchiveWriter::close`].

use std::io::{self, Read, Seek, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Default deflate level (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// How a single entry is compressed inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryCompression {
    /// Deflate at the writer's configured level
    Deflated,

    /// Stored as-is, for bodies that are already compressed
    Stored,
}

/// Writer for a backup archive.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    compression_level: u32,
    entries: usize,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Opens a new archive on `sink`. The level is clamped to 1-9.
    pub fn new(sink: W, compression_level: u32) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            compression_level: compression_level.clamp(1, 9),
            entries: 0,
        }
    }

    /// Starts a new entry; bytes written to the returned handle form its body.
    pub fn begin_entry(
        &mut self,
        name: &str,
        compression: EntryCompression,
    ) -> Result<EntryWriter<'_, W>> {
        let options = match compression {
            EntryCompression::Deflated => SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(i64::from(self.compression_level))),
            EntryCompression::Stored => {
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
            }
        }
        .large_file(true);

        debug!("Writing archive entry {}", name);
        self.zip.start_file(name, options)?;
        self.entries += 1;

        Ok(EntryWriter {
            zip: &mut self.zip,
            written: 0,
        })
    }

    /// Writes a complete entry by draining `reader`.
    pub fn write_entry<R: Read>(
        &mut self,
        name: &str,
        compression: EntryCompression,
        mut reader: R,
    ) -> Result<u64> {
        let mut entry = self.begin_entry(name, compression)?;
        let written = io::copy(&mut reader, &mut entry)?;
        Ok(written)
    }

    /// Writes a complete entry from an in-memory body.
    pub fn write_bytes(
        &mut self,
        name: &str,
        compression: EntryCompression,
        body: &[u8],
    ) -> Result<()> {
        self.begin_entry(name, compression)?.write_all(body)?;
        Ok(())
    }

    /// Number of entries started so far.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Writes the central directory and hands back the sink.
    pub fn close(self) -> Result<W> {
        let sink = self.zip.finish()?;
        Ok(sink)
    }
}

/// Body writer for the entry most recently started on an [`ArchiveWriter`].
pub struct EntryWriter<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
    written: u64,
}

impl<W: Write + Seek> EntryWriter<'_, W> {
    /// Uncompressed bytes written to this entry.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: Write + Seek> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.zip.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}

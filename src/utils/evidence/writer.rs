use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::constants::{ARCHIVE_EXTENSION, EVIDENCE_WRITE_BUFFER_SIZE};
use crate::models::SealedEvidence;
use crate::utils::hash::hash_file;

/// Hashes bytes on their way to the underlying writer.
///
/// Only writes that extend the stream sequentially are hashed. A write
/// below the high-water mark (the archive codec patching a header) or a
/// stream that did not start at offset zero marks the running digest as
/// stale, and the digest is then recomputed from disk.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    position: u64,
    end: u64,
    stale: bool,
}

impl<W> HashingWriter<W> {
    fn new(inner: W, start: u64) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            position: start,
            end: start,
            stale: start > 0,
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        if self.position == self.end {
            self.hasher.update(&buf[..written]);
        } else {
            self.stale = true;
        }
        self.position += written as u64;
        self.end = self.end.max(self.position);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for HashingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

type Output = HashingWriter<BufWriter<File>>;

enum Sink {
    Plain(Output),
    Archive(ZipWriter<Output>),
}

impl Sink {
    fn finish(self) -> io::Result<Output> {
        let mut output = match self {
            Sink::Plain(output) => output,
            Sink::Archive(mut archive) => archive.finish().map_err(zip_error)?,
        };
        output.flush()?;
        output.inner.get_ref().sync_all()?;
        Ok(output)
    }
}

fn zip_error(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "evidence file already closed")
}

/// Name of the single archive entry for a compressed evidence file.
///
/// `<dir>/PhysicalMemory.zip` stores an entry called `PhysicalMemory`.
pub fn entry_name(path: &Path) -> String {
    let has_archive_extension = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false);
    let name = if has_archive_extension { path.file_stem() } else { path.file_name() };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "evidence".to_string())
}

/// Write side of an evidentiary file.
///
/// Keeps two SHA-256 digests: one over the bytes fed in and one over the
/// bytes that reach disk. With compression enabled the file holds a single
/// Deflate entry inside a zip archive, so the two digests differ.
///
/// The digests are only available from [`EvidenceWriter::close`]; an open
/// stream never exposes a partial digest.
pub struct EvidenceWriter {
    path: PathBuf,
    compressed: bool,
    sink: Option<Sink>,
    input_hasher: Sha256,
    bytes_in: u64,
}

impl EvidenceWriter {
    /// Create a new evidence file for exclusive writing.
    ///
    /// Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, compress: bool) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let output = HashingWriter::new(BufWriter::with_capacity(EVIDENCE_WRITE_BUFFER_SIZE, file), 0);

        let sink = if compress {
            let mut archive = ZipWriter::new(output);
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(true);
            archive.start_file(entry_name(&path), options).map_err(zip_error)?;
            Sink::Archive(archive)
        } else {
            Sink::Plain(output)
        };

        debug!("Opened evidence file {} (compressed: {})", path.display(), compress);
        Ok(Self {
            path,
            compressed: compress,
            sink: Some(sink),
            input_hasher: Sha256::new(),
            bytes_in: 0,
        })
    }

    /// Open an uncompressed file for appending, creating it if needed.
    ///
    /// The input digest covers only the bytes appended through this handle;
    /// the output digest covers the whole file.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let start = file.metadata()?.len();
        let output = HashingWriter::new(BufWriter::with_capacity(EVIDENCE_WRITE_BUFFER_SIZE, file), start);

        Ok(Self {
            path,
            compressed: false,
            sink: Some(Sink::Plain(output)),
            input_hasher: Sha256::new(),
            bytes_in: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Number of bytes fed in so far.
    pub fn offset(&self) -> u64 {
        self.bytes_in
    }

    /// Finish the archive, flush to disk and seal both digests.
    pub fn close(mut self) -> io::Result<SealedEvidence> {
        let sink = self.sink.take().ok_or_else(closed_error)?;
        let output = sink.finish()?;

        let input_sha256 = format!("{:x}", std::mem::take(&mut self.input_hasher).finalize());
        let output_sha256 = if output.stale {
            debug!("Rehashing {} from disk", self.path.display());
            hash_file(&self.path)?
        } else {
            format!("{:x}", output.hasher.finalize())
        };
        let bytes_out = fs::metadata(&self.path)?.len();

        Ok(SealedEvidence {
            path: self.path.clone(),
            compressed: self.compressed,
            bytes_in: self.bytes_in,
            bytes_out,
            input_sha256,
            output_sha256,
        })
    }
}

impl Write for EvidenceWriter {
    /// Only bytes the sink accepted count toward the input digest.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let sink = self.sink.as_mut().ok_or_else(closed_error)?;
        let written = match sink {
            Sink::Plain(output) => output.write(buf)?,
            Sink::Archive(archive) => archive.write(buf)?,
        };
        self.input_hasher.update(&buf[..written]);
        self.bytes_in += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(Sink::Plain(output)) => output.flush(),
            Some(Sink::Archive(archive)) => archive.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for EvidenceWriter {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!("Evidence file {} dropped without close", self.path.display());
            if let Err(e) = sink.finish() {
                warn!("Failed to finish {}: {}", self.path.display(), e);
            }
        }
    }
}

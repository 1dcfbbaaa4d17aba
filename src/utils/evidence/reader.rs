use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use sha2::{Digest, Sha256};
use zip::{CompressionMethod, ZipArchive};

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Decoded stream of the single entry in a compressed evidence file.
///
/// The archive's central directory locates the entry; its data is then
/// streamed from the file handle the reader owns. Size and CRC-32 from the
/// directory are checked when the stream ends.
struct ArchivedEntry {
    name: String,
    decoder: Box<dyn Read + Send>,
    expected_size: u64,
    expected_crc: u32,
    crc: crc32fast::Hasher,
    produced: u64,
    finished: bool,
}

impl ArchivedEntry {
    fn open(file: File) -> io::Result<Self> {
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| invalid(e.to_string()))?;
        if archive.len() != 1 {
            return Err(invalid(format!("expected one archive entry, found {}", archive.len())));
        }

        let (name, method, data_start, compressed_size, expected_size, expected_crc) = {
            let entry = archive.by_index(0).map_err(|e| invalid(e.to_string()))?;
            (
                entry.name().to_string(),
                entry.compression(),
                entry.data_start(),
                entry.compressed_size(),
                entry.size(),
                entry.crc32(),
            )
        };

        let mut reader = archive.into_inner();
        reader.seek(SeekFrom::Start(data_start))?;
        let data = reader.take(compressed_size);
        let decoder: Box<dyn Read + Send> = match method {
            CompressionMethod::Stored => Box::new(data),
            CompressionMethod::Deflated => Box::new(DeflateDecoder::new(data)),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported compression {:?} for entry {}", other, name),
                ))
            }
        };

        Ok(Self {
            name,
            decoder,
            expected_size,
            expected_crc,
            crc: crc32fast::Hasher::new(),
            produced: 0,
            finished: false,
        })
    }

    fn verify(&mut self) -> io::Result<()> {
        self.finished = true;
        if self.produced != self.expected_size {
            return Err(invalid(format!(
                "entry {} decoded to {} bytes, archive says {}",
                self.name, self.produced, self.expected_size
            )));
        }
        let crc = std::mem::take(&mut self.crc).finalize();
        if crc != self.expected_crc {
            return Err(invalid(format!(
                "CRC mismatch for entry {}: {:#010x} != {:#010x}",
                self.name, crc, self.expected_crc
            )));
        }
        Ok(())
    }
}

impl Read for ArchivedEntry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let n = self.decoder.read(buf)?;
        if n == 0 {
            self.verify()?;
            return Ok(0);
        }
        self.crc.update(&buf[..n]);
        self.produced += n as u64;
        Ok(n)
    }
}

enum Source {
    Raw(BufReader<File>),
    Archived(ArchivedEntry),
}

/// Read side of an evidentiary file.
///
/// Reads are sequential. The digest of everything read becomes available
/// once the stream has been consumed to its end; before that
/// [`EvidenceReader::digest`] returns `None`.
pub struct EvidenceReader {
    path: PathBuf,
    source: Source,
    hasher: Option<Sha256>,
    digest: Option<String>,
    offset: u64,
}

impl EvidenceReader {
    /// Open a file and read its bytes as stored on disk.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self::with_source(path, Source::Raw(BufReader::new(file))))
    }

    /// Open a compressed evidence file and read the decompressed entry.
    ///
    /// The resulting digest equals the input digest recorded when the file
    /// was written.
    pub fn open_archived(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entry = ArchivedEntry::open(File::open(&path)?)?;
        Ok(Self::with_source(path, Source::Archived(entry)))
    }

    fn with_source(path: PathBuf, source: Source) -> Self {
        Self {
            path,
            source,
            hasher: Some(Sha256::new()),
            digest: None,
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// SHA-256 of the full stream, once it has been read to the end.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Read up to `length` bytes; fewer are returned only at end of file.
    pub fn read_up_to(&mut self, length: usize) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(length.min(crate::constants::DEFAULT_BUFFER_SIZE));
        self.by_ref().take(length as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Read everything that remains.
    pub fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// Read an evidence file to its end and return its digest and length.
///
/// With `archived` set the digest covers the decompressed entry, matching
/// the input digest recorded at write time.
pub fn verify_evidence(path: impl AsRef<Path>, archived: bool) -> io::Result<(String, u64)> {
    let mut reader = if archived {
        EvidenceReader::open_archived(path)?
    } else {
        EvidenceReader::open(path)?
    };
    io::copy(&mut reader, &mut io::sink())?;
    let digest = reader
        .digest()
        .map(str::to_string)
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "stream not fully read"))?;
    Ok((digest, reader.offset()))
}

impl Read for EvidenceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.source {
            Source::Raw(reader) => reader.read(buf)?,
            Source::Archived(entry) => entry.read(buf)?,
        };
        if n == 0 {
            if let Some(hasher) = self.hasher.take() {
                self.digest = Some(format!("{:x}", hasher.finalize()));
            }
            return Ok(0);
        }
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.offset += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::evidence::EvidenceWriter;
    use crate::utils::hash::hash_bytes;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_stored_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let mut archive = zip::ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            archive.start_file(*name, options).unwrap();
            archive.write_all(data).unwrap();
        }
        archive.finish().unwrap();
    }

    #[test]
    fn test_archived_stored_entry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stored.zip");
        write_stored_archive(&path, &[("stored", b"stored bytes")]);

        let mut reader = EvidenceReader::open_archived(&path).unwrap();
        assert_eq!(reader.read_remaining().unwrap(), b"stored bytes");
        assert_eq!(reader.digest(), Some(hash_bytes(b"stored bytes").as_str()));
    }

    #[test]
    fn test_archived_corruption_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.zip");
        write_stored_archive(&path, &[("stored", b"stored bytes")]);

        let mut raw = std::fs::read(&path).unwrap();
        let at = raw.windows(12).position(|w| w == b"stored bytes").unwrap();
        raw[at] ^= 0xFF;
        std::fs::write(&path, raw).unwrap();

        let mut reader = EvidenceReader::open_archived(&path).unwrap();
        let err = reader.read_remaining().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(reader.digest().is_none());
    }

    #[test]
    fn test_archive_with_extra_entries_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("two.zip");
        write_stored_archive(&path, &[("first", b"one"), ("second", b"two")]);

        let err = EvidenceReader::open_archived(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(EvidenceReader::open_archived(temp_dir.path().join("missing.zip")).is_err());
    }

    #[test]
    fn test_digest_only_after_full_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut reader = EvidenceReader::open(&path).unwrap();
        assert_eq!(reader.read_up_to(4).unwrap(), b"0123");
        assert_eq!(reader.offset(), 4);
        assert!(reader.digest().is_none());

        assert_eq!(reader.read_up_to(100).unwrap(), b"456789");
        assert_eq!(reader.offset(), 10);
        assert_eq!(reader.digest(), Some(hash_bytes(b"0123456789").as_str()));
        assert!(reader.read_up_to(4).unwrap().is_empty());
    }

    #[test]
    fn test_exact_length_read_does_not_lose_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"abcdef").unwrap();

        let mut reader = EvidenceReader::open(&path).unwrap();
        assert_eq!(reader.read_up_to(3).unwrap(), b"abc");
        assert_eq!(reader.read_up_to(3).unwrap(), b"def");
        assert!(reader.digest().is_none());
        assert!(reader.read_remaining().unwrap().is_empty());
        assert!(reader.digest().is_some());
    }

    #[test]
    fn test_archived_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.zip");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();

        let mut writer = EvidenceWriter::create(&path, true).unwrap();
        writer.write_all(&data).unwrap();
        let sealed = writer.close().unwrap();

        let mut reader = EvidenceReader::open_archived(&path).unwrap();
        assert_eq!(reader.read_remaining().unwrap(), data);
        assert_eq!(reader.digest(), Some(sealed.input_sha256.as_str()));

        let mut raw = EvidenceReader::open(&path).unwrap();
        raw.read_remaining().unwrap();
        assert_eq!(raw.digest(), Some(sealed.output_sha256.as_str()));
    }

    #[test]
    fn test_verify_evidence_matches_sealed_digests() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.bin");
        let packed = temp_dir.path().join("packed.bin.zip");
        let data = vec![0x42u8; 10_000];

        let mut writer = EvidenceWriter::create(&plain, false).unwrap();
        writer.write_all(&data).unwrap();
        let sealed_plain = writer.close().unwrap();

        let mut writer = EvidenceWriter::create(&packed, true).unwrap();
        writer.write_all(&data).unwrap();
        let sealed_packed = writer.close().unwrap();

        assert_eq!(
            verify_evidence(&plain, false).unwrap(),
            (sealed_plain.output_sha256.clone(), 10_000)
        );
        assert_eq!(
            verify_evidence(&packed, true).unwrap(),
            (sealed_packed.input_sha256.clone(), 10_000)
        );
        assert_eq!(verify_evidence(&packed, false).unwrap().0, sealed_packed.output_sha256);
        assert_eq!(hash_bytes(&data), sealed_packed.input_sha256);
    }
}

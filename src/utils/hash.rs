use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use sha2::{Sha256, Digest};

use crate::constants::DEFAULT_BUFFER_SIZE;

/// Calculate the SHA-256 hash of a file, streaming it from disk.
///
/// The file is never loaded into memory as a whole, so this works for
/// memory images larger than available RAM.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let (digest, _) = hash_reader(BufReader::new(file))?;
    Ok(digest)
}

/// Hash everything a reader yields.
///
/// Returns the lowercase hex digest and the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_hash_bytes_known_vectors() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_reader_counts_bytes() {
        let data = vec![7u8; DEFAULT_BUFFER_SIZE + 17];
        let (digest, total) = hash_reader(Cursor::new(&data)).unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(digest, hash_bytes(&data));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("evidence.bin");
        std::fs::write(&path, b"chain of custody").unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"chain of custody"));
    }

    #[test]
    fn test_hash_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(hash_file(&temp_dir.path().join("absent")).is_err());
    }
}

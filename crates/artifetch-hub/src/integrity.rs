use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{HubError, HubResult};

const READ_BUFFER: usize = 1024 * 1024;

/// Compute the SHA-256 hex digest of a file on disk, streaming it in 1 MiB
/// reads so multi-gigabyte weights never sit in memory.
pub fn sha256_file(path: &Path) -> HubResult<String> {
    let file = File::open(path).map_err(HubError::Io)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buf).map_err(HubError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 hex digest of an in-memory string.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Whether the file at `path` hashes to `expected_sha256`.
///
/// Used to recognise a local file that already holds the content a
/// content-addressed ETag names.
pub fn matches_sha256(path: &Path, expected_sha256: &str) -> HubResult<bool> {
    let actual = sha256_file(path)?;
    debug!(
        path = %path.display(),
        expected = expected_sha256,
        actual = %actual,
        "Comparing local file hash"
    );
    Ok(actual.eq_ignore_ascii_case(expected_sha256))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn write_temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_sha256_known_value() {
        let path = write_temp_file("artifetch_sha_test.txt", b"hello");
        let digest = sha256_file(&path).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sha256_hex_matches_file_digest() {
        assert_eq!(
            sha256_hex("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_matches_sha256() {
        let path = write_temp_file("artifetch_match_ok.txt", b"hello");
        assert!(matches_sha256(
            &path,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        )
        .unwrap());
        assert!(!matches_sha256(
            &path,
            "0000000000000000000000000000000000000000000000000000000000000000"
        )
        .unwrap());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sha256_empty_file() {
        let path = write_temp_file("artifetch_sha_empty.txt", b"");
        let digest = sha256_file(&path).unwrap();
        // SHA-256 of empty string
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = temp_dir().join("artifetch_definitely_missing.bin");
        assert!(matches!(sha256_file(&path), Err(HubError::Io(_))));
    }
}

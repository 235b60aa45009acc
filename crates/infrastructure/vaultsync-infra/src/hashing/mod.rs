use camino::{Utf8Path, Utf8PathBuf};
use md5::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use vaultsync_core::Fingerprint;

/// Read buffer size. The digest does not depend on it.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("IO error hashing {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Streams files through an incremental MD5 context.
///
/// MD5 is what Drive reports as `md5Checksum`, so local and remote
/// fingerprints compare directly.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ContentHasher {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn fingerprint(&self, path: &Utf8Path) -> Result<Fingerprint, HashError> {
        let io_err = |source| HashError::Io {
            path: path.to_owned(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        fingerprint_reader(BufReader::new(file), self.chunk_size).map_err(io_err)
    }
}

/// Hash a file with the default chunk size.
pub fn fingerprint(path: &Utf8Path) -> Result<Fingerprint, HashError> {
    ContentHasher::default().fingerprint(path)
}

pub fn fingerprint_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Fingerprint> {
    let mut hasher = Context::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.consume(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    format!("{:x}", md5::compute(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn known_digest() {
        assert_eq!(fingerprint_bytes(b"hello"), HELLO_MD5);
        assert_eq!(fingerprint_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn chunk_size_does_not_change_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("blob.bin")).unwrap();
        let data: Vec<u8> = (0..100_003u32).map(|i| (i % 251) as u8).collect();
        File::create(&path).unwrap().write_all(&data).unwrap();

        let expected = fingerprint_bytes(&data);
        for chunk in [1, 7, 4096, DEFAULT_CHUNK_SIZE, 1 << 20] {
            let got = ContentHasher::with_chunk_size(chunk)
                .fingerprint(&path)
                .unwrap();
            assert_eq!(got, expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn same_bytes_same_digest_regardless_of_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("a.md"), b"hello").unwrap();
        std::fs::create_dir_all(root.join("deep/er")).unwrap();
        std::fs::write(root.join("deep/er/b.txt"), b"hello").unwrap();

        assert_eq!(fingerprint(&root.join("a.md")).unwrap(), HELLO_MD5);
        assert_eq!(fingerprint(&root.join("deep/er/b.txt")).unwrap(), HELLO_MD5);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("gone.md")).unwrap();
        let err = fingerprint(&path).unwrap_err();
        let HashError::Io { path: p, source } = err;
        assert_eq!(p, path);
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
    }
}

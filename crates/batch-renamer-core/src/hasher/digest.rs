//! Single-file streaming digests.

use crate::model::{HashAlgorithm, HashEntry};
use crate::paths;
use std::fs::{self, File};
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::XxHash64;

/// Incremental hasher over one of the supported algorithms.
pub enum StreamHasher {
    Xxh64(XxHash64),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh64 => StreamHasher::Xxh64(XxHash64::with_seed(0)),
            HashAlgorithm::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Xxh64(h) => h.write(data),
            StreamHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    pub fn finish_hex(self) -> String {
        match self {
            StreamHasher::Xxh64(h) => format!("{:016x}", h.finish()),
            StreamHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash `reader` in `chunk_size` pieces. Returns the hex digest and the
/// number of bytes read.
pub fn hash_reader<R: Read>(
    mut reader: R,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> io::Result<(String, u64)> {
    let mut hasher = StreamHasher::new(algorithm);
    let mut buffer = vec![0u8; chunk_size.max(4096)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }
    Ok((hasher.finish_hex(), total))
}

/// Hash a file without consulting any cache. The mtime is captured before
/// reading so a concurrent modification leaves the entry stale rather than
/// silently wrong.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm, chunk_size: usize) -> io::Result<HashEntry> {
    let metadata = fs::metadata(path)?;
    let source_mtime = paths::modified_nanos(&metadata);
    let file = File::open(path)?;
    let (value, bytes) = hash_reader(file, algorithm, chunk_size)?;
    Ok(HashEntry {
        algorithm,
        value,
        computed_at: chrono::Utc::now().timestamp_millis(),
        source_mtime,
        source_size: bytes,
    })
}

pub fn hash_data(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(data);
    hasher.finish_hex()
}

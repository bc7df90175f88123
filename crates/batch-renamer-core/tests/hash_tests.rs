use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

use batch_renamer_core::hasher::digest;
use batch_renamer_core::{
    HashAlgorithm, HashProgress, ParallelHashWorker, PersistentCacheStore, ProgressReporter,
    SilentReporter,
};

/// Deterministic pseudo-random bytes (64-bit LCG).
fn lcg_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

fn write_random_files(dir: &Path, count: usize) -> Vec<(PathBuf, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let len = (i * 7919) % 150_000;
            let data = lcg_bytes(i as u64, len);
            let path = dir.join(format!("random_{:02}.bin", i));
            fs::write(&path, &data).unwrap();
            (path, data)
        })
        .collect()
}

fn worker(workers: usize) -> ParallelHashWorker {
    let cache = Arc::new(PersistentCacheStore::in_memory(1024));
    ParallelHashWorker::with_workers(cache, workers, 4096).unwrap()
}

#[test]
fn test_serial_and_parallel_hashes_agree() {
    let tmp = tempdir().unwrap();
    let files = write_random_files(tmp.path(), 50);
    let paths: Vec<PathBuf> = files.iter().map(|(p, _)| p.clone()).collect();

    for algorithm in HashAlgorithm::ALL {
        let serial = worker(1).checksums(&paths, algorithm, &SilentReporter);
        let parallel = worker(8).checksums(&paths, algorithm, &SilentReporter);

        assert_eq!(serial.results.len(), 50);
        assert_eq!(parallel.results.len(), 50);
        assert!(serial.errors.is_empty() && parallel.errors.is_empty());

        for ((s, p), (path, data)) in serial.results.iter().zip(&parallel.results).zip(&files) {
            assert_eq!(&s.path, path);
            assert_eq!(&p.path, path);
            assert_eq!(s.entry.value, p.entry.value);
            assert_eq!(s.entry.value, digest::hash_data(data, algorithm));
        }
    }
}

#[test]
fn test_second_pass_is_served_from_cache() {
    let tmp = tempdir().unwrap();
    let files = write_random_files(tmp.path(), 10);
    let paths: Vec<PathBuf> = files.iter().map(|(p, _)| p.clone()).collect();
    let total_bytes: u64 = files.iter().map(|(_, d)| d.len() as u64).sum();

    let worker = worker(4);
    let first = worker.checksums(&paths, HashAlgorithm::Xxh64, &SilentReporter);
    assert_eq!(first.progress.files_done, 10);
    assert_eq!(first.progress.bytes_processed, total_bytes);
    assert_eq!(first.progress.cache_hits, 0);

    let second = worker.checksums(&paths, HashAlgorithm::Xxh64, &SilentReporter);
    assert_eq!(second.progress.cache_hits, 10);
    assert_eq!(second.progress.bytes_processed, 0);
    assert!(second.results.iter().all(|h| h.cached));

    // A modified file is rehashed.
    fs::write(&paths[3], b"changed").unwrap();
    let third = worker.checksums(&paths[3..4], HashAlgorithm::Xxh64, &SilentReporter);
    assert!(!third.results[0].cached);
    assert_eq!(
        third.results[0].entry.value,
        digest::hash_data(b"changed", HashAlgorithm::Xxh64)
    );
}

#[test]
fn test_missing_file_is_reported_not_fatal() {
    let tmp = tempdir().unwrap();
    let present = tmp.path().join("present.txt");
    fs::write(&present, "here").unwrap();
    let paths = vec![tmp.path().join("absent.txt"), present.clone()];

    let batch = worker(2).checksums(&paths, HashAlgorithm::Blake3, &SilentReporter);
    assert_eq!(batch.results.len(), 1);
    assert_eq!(batch.results[0].path, present);
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].0, tmp.path().join("absent.txt"));
    assert!(!batch.cancelled);
}

#[test]
fn test_find_duplicates() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    fs::create_dir(dir.join("sub")).unwrap();
    let big = lcg_bytes(42, 8192);
    fs::write(dir.join("big_1.bin"), &big).unwrap();
    fs::write(dir.join("sub/big_2.bin"), &big).unwrap();
    fs::write(dir.join("big_3.bin"), &big).unwrap();
    fs::write(dir.join("small_1.txt"), "same").unwrap();
    fs::write(dir.join("small_2.txt"), "same").unwrap();
    fs::write(dir.join("same_size.txt"), "diff").unwrap();
    fs::write(dir.join("unique.txt"), "only one of these").unwrap();
    fs::write(dir.join("empty_1.txt"), "").unwrap();
    fs::write(dir.join("empty_2.txt"), "").unwrap();

    let paths: Vec<PathBuf> = [
        "big_1.bin",
        "sub/big_2.bin",
        "big_3.bin",
        "small_1.txt",
        "small_2.txt",
        "same_size.txt",
        "unique.txt",
        "empty_1.txt",
        "empty_2.txt",
    ]
    .iter()
    .map(|n| dir.join(n))
    .collect();

    let report = worker(4).find_duplicates(&paths, HashAlgorithm::Xxh64, &SilentReporter);
    assert!(report.errors.is_empty());
    assert_eq!(report.groups.len(), 2);

    let largest = &report.groups[0];
    assert_eq!(largest.size, 8192);
    assert_eq!(largest.paths.len(), 3);
    assert_eq!(largest.wasted_bytes(), 16384);

    let small = &report.groups[1];
    assert_eq!(
        small.paths,
        vec![dir.join("small_1.txt"), dir.join("small_2.txt")]
    );
}

#[test]
fn test_compare_folders() {
    let tmp = tempdir().unwrap();
    let left = tmp.path().join("left");
    let right = tmp.path().join("right");
    for root in [&left, &right] {
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("same.txt"), "identical").unwrap();
        fs::write(root.join("nested/deep.txt"), "deep identical").unwrap();
    }
    fs::write(left.join("edited.txt"), "version one").unwrap();
    fs::write(right.join("edited.txt"), "version two").unwrap();
    fs::write(left.join("resized.txt"), "short").unwrap();
    fs::write(right.join("resized.txt"), "much longer").unwrap();
    fs::write(left.join("left_only.txt"), "l").unwrap();
    fs::write(right.join("right_only.txt"), "r").unwrap();

    let comparison = worker(4)
        .compare_folders(&left, &right, HashAlgorithm::Blake3, &[], &SilentReporter)
        .unwrap();

    let mut matches = comparison.matches.clone();
    matches.sort();
    assert_eq!(
        matches,
        vec![PathBuf::from("nested/deep.txt"), PathBuf::from("same.txt")]
    );
    assert_eq!(
        comparison.mismatches,
        vec![PathBuf::from("edited.txt"), PathBuf::from("resized.txt")]
    );
    assert_eq!(comparison.only_left, vec![PathBuf::from("left_only.txt")]);
    assert_eq!(comparison.only_right, vec![PathBuf::from("right_only.txt")]);
    assert!(!comparison.cancelled);
}

/// Cancels the batch as soon as the first file completes.
struct CancelOnFirst {
    token: Arc<AtomicBool>,
}

impl ProgressReporter for CancelOnFirst {
    fn on_hash_progress(&self, _current: &Path, _progress: HashProgress) {
        self.token.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_cancellation_stops_dispatch() {
    let tmp = tempdir().unwrap();
    let files = write_random_files(tmp.path(), 30);
    let paths: Vec<PathBuf> = files.iter().map(|(p, _)| p.clone()).collect();

    let worker = worker(1);
    let reporter = CancelOnFirst {
        token: worker.cancel_token(),
    };
    let batch = worker.checksums(&paths, HashAlgorithm::Xxh64, &reporter);

    assert!(batch.cancelled);
    assert!(batch.results.len() < paths.len());
    assert!(batch.errors.is_empty());
    assert_eq!(batch.progress.files_done, batch.results.len());

    // The flag is cleared by the next batch.
    let again = worker.checksums(&paths, HashAlgorithm::Xxh64, &SilentReporter);
    assert!(!again.cancelled);
    assert_eq!(again.results.len(), paths.len());
}

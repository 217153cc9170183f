//! Pack written `.eml` files into count- and size-bounded import batches.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::export::naming::{create_unique, split_file_name};
use crate::model::report::{Batch, OutputFile};

const MIB: u64 = 1024 * 1024;

/// Stop probing for a free batch directory after this many suffixes.
const MAX_DIR_SUFFIX: u32 = 10_000;

/// Upper bounds for a single batch. Both are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    max_count: usize,
    max_bytes: u64,
}

impl BatchLimits {
    pub fn new(max_count: usize, max_bytes: u64) -> Result<Self> {
        if max_count < 1 {
            return Err(ConvertError::Configuration(
                "batch message limit must be at least 1".to_string(),
            ));
        }
        if max_bytes < 1 {
            return Err(ConvertError::Configuration(
                "batch size limit must be at least 1 byte".to_string(),
            ));
        }
        Ok(Self {
            max_count,
            max_bytes,
        })
    }

    /// Limits with the size bound given in mebibytes.
    pub fn with_megabytes(max_count: usize, max_megabytes: u64) -> Result<Self> {
        if max_megabytes < 1 {
            return Err(ConvertError::Configuration(
                "batch size limit must be at least 1 MB".to_string(),
            ));
        }
        Self::new(max_count, max_megabytes.saturating_mul(MIB))
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_count: 50,
            max_bytes: 100 * MIB,
        }
    }
}

/// Batching stage settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub limits: BatchLimits,
    /// Sort files by ascending size before packing.
    pub sort_by_size: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            limits: BatchLimits::default(),
            sort_by_size: true,
        }
    }
}

/// Greedy single-pass partition preserving input order.
///
/// A new batch starts whenever adding the next file would exceed either limit
/// and the current batch is not empty, so a file larger than `max_bytes`
/// always ends up alone in its own batch.
pub fn partition(files: &[OutputFile], limits: &BatchLimits) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::default();

    for file in files {
        let over_count = current.len() + 1 > limits.max_count;
        let over_size = current.total_size.saturating_add(file.size) > limits.max_bytes;
        if !current.is_empty() && (over_count || over_size) {
            batches.push(std::mem::take(&mut current));
        }
        current.push(file.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }

    for batch in batches.iter().filter(|b| b.is_oversized(limits.max_bytes)) {
        warn!(
            file = %batch.files[0].path.display(),
            size = batch.total_size,
            max_bytes = limits.max_bytes,
            "File exceeds batch size limit, placed in its own batch"
        );
    }
    batches
}

/// Stable ascending sort by size, so equal-sized files keep archive order.
pub fn sort_by_size(files: &mut [OutputFile]) {
    files.sort_by_key(|f| f.size);
}

/// Directory name for the 1-based batch `index`.
pub fn batch_dir_name(index: usize, batch: &Batch) -> String {
    format!("batch_{:03}_{}msg", index, batch.len())
}

/// Copy one batch into a fresh `root/batch_NNN_Kmsg` directory.
///
/// A directory left by an earlier run is never reused: the new one becomes
/// `batch_NNN_Kmsg_1`, `batch_NNN_Kmsg_2`, … so every directory holds exactly
/// the files its name announces. The chosen path is recorded on the batch.
pub fn write_batch(root: &Path, index: usize, batch: &mut Batch) -> Result<PathBuf> {
    std::fs::create_dir_all(root).map_err(|e| ConvertError::io(root, e))?;
    let dir = create_unique_dir(root, &batch_dir_name(index, batch))?;

    for file in &batch.files {
        let name = file.file_name();
        let (stem, ext) = split_file_name(&name);
        let (target, mut out) = create_unique(&dir, stem, ext)?;
        let mut src = File::open(&file.path).map_err(|e| ConvertError::io(&file.path, e))?;
        if let Err(e) = std::io::copy(&mut src, &mut out) {
            let _ = std::fs::remove_file(&target);
            return Err(ConvertError::io(&target, e));
        }
        debug!(from = %file.path.display(), to = %target.display(), "Copied into batch");
    }

    info!(
        dir = %dir.display(),
        messages = batch.len(),
        bytes = batch.total_size,
        "Batch written"
    );
    batch.directory = Some(dir.clone());
    Ok(dir)
}

/// Create `root/name` exclusively, falling back to `name_1`, `name_2`, ….
fn create_unique_dir(root: &Path, name: &str) -> Result<PathBuf> {
    let mut candidate = root.join(name);
    for counter in 1..=MAX_DIR_SUFFIX {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{name}_{counter}"));
            }
            Err(e) => return Err(ConvertError::io(&candidate, e)),
        }
    }
    Err(ConvertError::io(
        &candidate,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free directory name left for this batch",
        ),
    ))
}

/// Lay out every batch under `root`, numbering from 1.
pub fn write_batches(root: &Path, batches: &mut [Batch]) -> Result<Vec<PathBuf>> {
    batches
        .iter_mut()
        .enumerate()
        .map(|(i, batch)| write_batch(root, i + 1, batch))
        .collect()
}

/// List the `.eml` files directly inside `dir`, sorted by file name.
pub fn scan_eml_dir(dir: &Path) -> Result<Vec<OutputFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConvertError::io(dir, e))?;
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(dir, e))?;
        let path = entry.path();
        if !is_eml(&path) {
            continue;
        }
        let meta = entry.metadata().map_err(|e| ConvertError::io(&path, e))?;
        if meta.is_file() {
            files.push(OutputFile {
                path,
                size: meta.len(),
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

pub(crate) fn is_eml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(sizes: &[u64]) -> Vec<OutputFile> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| OutputFile {
                path: PathBuf::from(format!("{i:04}.eml")),
                size,
            })
            .collect()
    }

    fn sizes(batches: &[Batch]) -> Vec<Vec<u64>> {
        batches
            .iter()
            .map(|b| b.files.iter().map(|f| f.size).collect())
            .collect()
    }

    #[test]
    fn test_limits_reject_zero() {
        assert!(matches!(
            BatchLimits::new(0, 10),
            Err(ConvertError::Configuration(_))
        ));
        assert!(matches!(
            BatchLimits::new(10, 0),
            Err(ConvertError::Configuration(_))
        ));
        assert!(BatchLimits::with_megabytes(5, 0).is_err());
        assert_eq!(BatchLimits::with_megabytes(5, 2).unwrap().max_bytes(), 2 * MIB);
    }

    #[test]
    fn test_partition_by_count() {
        let limits = BatchLimits::new(2, 1000).unwrap();
        let batches = partition(&files(&[1, 1, 1, 1, 1]), &limits);
        assert_eq!(sizes(&batches), vec![vec![1, 1], vec![1, 1], vec![1]]);
    }

    #[test]
    fn test_partition_by_size() {
        let limits = BatchLimits::new(10, 10).unwrap();
        let batches = partition(&files(&[4, 4, 4, 6, 1]), &limits);
        assert_eq!(sizes(&batches), vec![vec![4, 4], vec![4, 6], vec![1]]);
    }

    #[test]
    fn test_partition_exact_fit_stays_together() {
        let limits = BatchLimits::new(2, 10).unwrap();
        let batches = partition(&files(&[5, 5]), &limits);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].total_size, 10);
    }

    #[test]
    fn test_partition_oversized_file_alone() {
        let limits = BatchLimits::new(10, 10).unwrap();
        let batches = partition(&files(&[3, 25, 3]), &limits);
        assert_eq!(sizes(&batches), vec![vec![3], vec![25], vec![3]]);
        assert!(batches[1].is_oversized(10));
        assert!(!batches[0].is_oversized(10));
    }

    #[test]
    fn test_partition_oversized_first() {
        let limits = BatchLimits::new(10, 10).unwrap();
        let batches = partition(&files(&[50, 1, 1]), &limits);
        assert_eq!(sizes(&batches), vec![vec![50], vec![1, 1]]);
    }

    #[test]
    fn test_partition_empty_input() {
        assert!(partition(&[], &BatchLimits::default()).is_empty());
    }

    #[test]
    fn test_partition_invariants_hold() {
        let input = files(&[7, 1, 90, 3, 3, 12, 40, 40, 2, 0, 65, 9, 9, 9, 100, 1]);
        let limits = BatchLimits::new(3, 50).unwrap();
        let batches = partition(&input, &limits);

        for batch in &batches {
            assert!(!batch.is_empty());
            assert!(batch.len() <= 3);
            assert!(batch.total_size <= 50 || batch.is_oversized(50));
            assert_eq!(batch.total_size, batch.files.iter().map(|f| f.size).sum::<u64>());
        }
        let flattened: Vec<&OutputFile> = batches.iter().flat_map(|b| &b.files).collect();
        let original: Vec<&OutputFile> = input.iter().collect();
        assert_eq!(flattened, original);
    }

    #[test]
    fn test_sort_by_size_is_stable() {
        let mut input = files(&[5, 1, 5, 0]);
        sort_by_size(&mut input);
        let names: Vec<String> = input.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, ["0003.eml", "0001.eml", "0000.eml", "0002.eml"]);
    }

    #[test]
    fn test_write_batches_copies_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("all_eml");
        std::fs::create_dir(&src).unwrap();
        for name in ["a.eml", "b.eml", "c.eml"] {
            std::fs::write(src.join(name), name.as_bytes()).unwrap();
        }
        let scanned = scan_eml_dir(&src).unwrap();
        let mut batches = partition(&scanned, &BatchLimits::new(2, 1000).unwrap());
        let dirs = write_batches(dir.path(), &mut batches).unwrap();

        assert_eq!(dirs[0], dir.path().join("batch_001_2msg"));
        assert_eq!(dirs[1], dir.path().join("batch_002_1msg"));
        assert_eq!(
            std::fs::read(dirs[1].join("c.eml")).unwrap(),
            b"c.eml"
        );
        assert_eq!(batches[0].directory.as_deref(), Some(dirs[0].as_path()));
        assert!(src.join("a.eml").exists());
    }

    #[test]
    fn test_write_batch_never_reuses_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("m.eml");
        std::fs::write(&src, b"new").unwrap();
        let mut batch = partition(&[OutputFile::from_path(&src).unwrap()], &BatchLimits::default())
            .remove(0);

        let old_dir = dir.path().join("batch_001_1msg");
        std::fs::create_dir(&old_dir).unwrap();
        std::fs::write(old_dir.join("m.eml"), b"old").unwrap();

        let written = write_batch(dir.path(), 1, &mut batch).unwrap();
        assert_eq!(written, dir.path().join("batch_001_1msg_1"));
        assert_eq!(batch.directory.as_deref(), Some(written.as_path()));
        assert_eq!(std::fs::read(old_dir.join("m.eml")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(&old_dir).unwrap().count(), 1);
        assert_eq!(std::fs::read(written.join("m.eml")).unwrap(), b"new");
    }

    #[test]
    fn test_scan_eml_dir_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.eml"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.EML"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.eml")).unwrap();

        let found = scan_eml_dir(dir.path()).unwrap();
        let names: Vec<String> = found.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, ["a.EML", "b.eml"]);
        assert_eq!(found[1].size, 2);
    }

    #[test]
    fn test_scan_missing_dir() {
        let err = scan_eml_dir(Path::new("/no/such/dir")).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }
}

//! Mirror state inspection
//!
//! A mirror is either absent, or present together with a measurement of its
//! object store: the number of files under `objects/` and the size of the
//! largest `.pack` among them.

use crate::error::InspectionError;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const PACK_SUFFIX: &str = ".pack";

/// State of a local mirror path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Absent,
    Present {
        largest_pack_bytes: u64,
        object_count: u64,
    },
}

impl MirrorState {
    pub fn largest_pack_bytes(&self) -> Option<u64> {
        match self {
            MirrorState::Present {
                largest_pack_bytes, ..
            } => Some(*largest_pack_bytes),
            MirrorState::Absent => None,
        }
    }

    pub fn object_count(&self) -> Option<u64> {
        match self {
            MirrorState::Present { object_count, .. } => Some(*object_count),
            MirrorState::Absent => None,
        }
    }
}

/// Determine whether `local_path` exists and measure its object store
pub fn inspect(local_path: &Path) -> Result<MirrorState, InspectionError> {
    match std::fs::metadata(local_path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MirrorState::Absent),
        Err(e) => return Err(InspectionError::new(local_path, e)),
    }

    let objects_dir = local_path.join("objects");
    let mut largest_pack_bytes = 0u64;
    let mut object_count = 0u64;

    for entry in WalkDir::new(&objects_dir) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| objects_dir.clone());
            InspectionError::new(path, io::Error::from(e))
        })?;

        if entry.file_type().is_dir() {
            continue;
        }
        object_count += 1;

        if !entry.file_name().to_string_lossy().ends_with(PACK_SUFFIX) {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| InspectionError::new(entry.path(), io::Error::from(e)))?
            .len();
        largest_pack_bytes = largest_pack_bytes.max(size);
    }

    debug!(
        "Inspected {}: {} object files, largest pack {} bytes",
        local_path.display(),
        object_count,
        largest_pack_bytes
    );

    Ok(MirrorState::Present {
        largest_pack_bytes,
        object_count,
    })
}

/// [`inspect`] on the blocking pool, for use from async pipelines
pub async fn inspect_async(local_path: &Path) -> Result<MirrorState, InspectionError> {
    let path: PathBuf = local_path.to_path_buf();
    let fallback = path.clone();
    tokio::task::spawn_blocking(move || inspect(&path))
        .await
        .unwrap_or_else(|e| {
            Err(InspectionError::new(
                fallback,
                io::Error::new(io::ErrorKind::Other, e),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_sized(path: &Path, len: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        file.set_len(len).unwrap();
    }

    #[test]
    fn test_absent_mirror() {
        let temp = TempDir::new().unwrap();
        let state = inspect(&temp.path().join("team/api.git")).unwrap();
        assert_eq!(state, MirrorState::Absent);
        assert_eq!(state.object_count(), None);
        assert_eq!(state.largest_pack_bytes(), None);
    }

    #[test]
    fn test_present_mirror_counts_files_not_dirs() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("api.git");

        write_sized(&mirror.join("objects/pack/pack-aaa.pack"), 10);
        write_sized(&mirror.join("objects/pack/pack-aaa.idx"), 4);
        write_sized(&mirror.join("objects/pack/pack-bbb.pack"), 25);
        write_sized(&mirror.join("objects/ab/cdef0123"), 100);
        fs::create_dir_all(mirror.join("objects/info")).unwrap();
        // Files outside objects/ are ignored
        write_sized(&mirror.join("big.pack"), 1000);

        let state = inspect(&mirror).unwrap();
        assert_eq!(
            state,
            MirrorState::Present {
                largest_pack_bytes: 25,
                object_count: 4,
            }
        );
        assert_eq!(state.object_count(), Some(4));
    }

    #[test]
    fn test_loose_objects_do_not_count_as_packs() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("api.git");
        write_sized(&mirror.join("objects/ab/cdef0123"), 500);

        let state = inspect(&mirror).unwrap();
        assert_eq!(state.largest_pack_bytes(), Some(0));
    }

    #[test]
    fn test_present_without_object_store_is_error() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("broken.git");
        fs::create_dir_all(&mirror).unwrap();

        let err = inspect(&mirror).unwrap_err();
        assert!(err.path.ends_with("objects"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_notfound_error_is_surfaced() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("gitlab.example.com");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = inspect(&blocker.join("team/api.git")).unwrap_err();
        assert_ne!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inspect_async_matches_sync() {
        let temp = TempDir::new().unwrap();
        let mirror = temp.path().join("api.git");
        write_sized(&mirror.join("objects/pack/pack-x.pack"), 7);

        let state = inspect_async(&mirror).await.unwrap();
        assert_eq!(state, inspect(&mirror).unwrap());
    }
}

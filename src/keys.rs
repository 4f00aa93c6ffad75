//! Storage key and local path derivation.

use std::path::{Path, PathBuf};

/// Suffix the export mechanism appends to a single-shard snapshot export.
const EXPORT_SUFFIX: &str = "-0001.rdb";

/// Object storage key under which the export of `snapshot_name` lands.
///
/// ```
/// assert_eq!(cachesnap::storage_key("snap-2024-01-01"), "snap-2024-01-01-0001.rdb");
/// ```
pub fn storage_key(snapshot_name: &str) -> String {
    format!("{}{}", snapshot_name, EXPORT_SUFFIX)
}

/// Local file the snapshot is downloaded to: `<downloads_dir>/<name>.rdb`.
pub fn local_path(downloads_dir: &Path, snapshot_name: &str) -> PathBuf {
    downloads_dir.join(format!("{}.rdb", snapshot_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_suffix() {
        assert_eq!(storage_key("snap-2024-01-01"), "snap-2024-01-01-0001.rdb");
        assert_eq!(storage_key("s1"), "s1-0001.rdb");
    }

    #[test]
    fn test_storage_key_distinguishes_names() {
        assert_ne!(storage_key("a"), storage_key("b"));
        assert_ne!(storage_key("cache-1"), storage_key("cache-10"));
    }

    #[test]
    fn test_local_path() {
        assert_eq!(
            local_path(Path::new("downloads"), "s1"),
            PathBuf::from("downloads/s1.rdb")
        );
    }
}

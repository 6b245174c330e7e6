//! 一時成果物のクリーンアップ
//!
//! 生成した `.dockerignore` や抽出アーカイブなど、実行中に作られた
//! ファイルシステム上の成果物を登録し、プロセス終了時に一括で
//! ベストエフォート削除します。登録は実行中の追記のみ、削除は
//! 終了時に一度だけ行われます。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ResourceTracker {
    paths: Mutex<BTreeSet<PathBuf>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("registered for cleanup: {}", path.display());
        if let Ok(mut paths) = self.paths.lock() {
            paths.insert(path);
        }
    }

    /// 登録済みパスを全て削除する（冪等・ベストエフォート）
    ///
    /// 存在しないパスは無視、ファイルとシンボリックリンクは削除、
    /// ディレクトリは空の場合のみ削除します。
    pub fn clean_all(&self) {
        let paths = match self.paths.lock() {
            Ok(mut paths) => std::mem::take(&mut *paths),
            Err(_) => return,
        };
        for path in paths {
            Self::clean(&path);
        }
    }

    fn clean(path: &Path) {
        debug!("cleaning up {}", path.display());
        let metadata = match path.symlink_metadata() {
            Ok(metadata) => metadata,
            Err(_) => return,
        };
        let result = if metadata.is_dir() {
            // 空でないディレクトリは消さない
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };
        if let Err(e) = result {
            debug!("could not clean up {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_clean_all_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("artifact.tar");
        fs::write(&file, b"data").unwrap();

        let tracker = ResourceTracker::new();
        tracker.register(&file);
        tracker.clean_all();
        assert!(!file.exists());
    }

    #[test]
    fn test_missing_path_is_noop() {
        let tracker = ResourceTracker::new();
        tracker.register("/nonexistent/definitely/not/here");
        tracker.clean_all();
        // 2回目も安全
        tracker.clean_all();
    }

    #[test]
    fn test_empty_dir_removed_nonempty_kept() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        let full = dir.path().join("full");
        fs::create_dir(&empty).unwrap();
        fs::create_dir(&full).unwrap();
        fs::write(full.join("keep.txt"), b"x").unwrap();

        let tracker = ResourceTracker::new();
        tracker.register(&empty);
        tracker.register(&full);
        tracker.clean_all();

        assert!(!empty.exists());
        assert!(full.exists());
        assert!(full.join("keep.txt").exists());
    }

    #[test]
    fn test_registration_deduplicates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("once.txt");
        fs::write(&file, b"x").unwrap();

        let tracker = ResourceTracker::new();
        tracker.register(&file);
        tracker.register(&file);
        tracker.clean_all();
        assert!(!file.exists());
    }
}

//! ビルド中だけ有効なファイルシステム変更のガード
//!
//! Dockerfile の FROM 書き換えと `.dockerignore` の合成は、どちらも
//! ビルドの間だけ有効で、成功・失敗を問わず必ず元に戻す必要が
//! あります。呼び出し側での try/finally の複製を避けるため、
//! Drop で復元する RAII ガードとして表現します。

use crate::tracker::ResourceTracker;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Dockerfile のベースイメージをビルド中だけ差し替えるガード
///
/// 生成時に FROM 行を書き換えた内容を書き込み、Drop で元の内容を
/// バイト単位でそのまま復元します。
pub struct RewrittenDockerfile {
    path: PathBuf,
    original: String,
}

impl RewrittenDockerfile {
    pub fn rewrite(path: &Path, base_image: &str) -> std::io::Result<Self> {
        let original = fs::read_to_string(path)?;
        let mut rewritten = String::with_capacity(original.len());
        for line in original.lines() {
            let line = line.trim();
            if line.starts_with("FROM") {
                rewritten.push_str("FROM ");
                rewritten.push_str(base_image);
            } else {
                rewritten.push_str(line);
            }
            rewritten.push('\n');
        }
        fs::write(path, rewritten)?;
        debug!("rewrote base image of {} to {}", path.display(), base_image);
        Ok(Self {
            path: path.to_path_buf(),
            original,
        })
    }
}

impl Drop for RewrittenDockerfile {
    fn drop(&mut self) {
        if let Err(e) = fs::write(&self.path, &self.original) {
            warn!("failed to restore {}: {}", self.path.display(), e);
        }
    }
}

/// コンテキスト直下に `.dockerignore` が無い場合だけ合成するガード
///
/// Drop で削除します。プロセス異常終了に備えて ResourceTracker にも
/// 登録しておきます。
pub struct SyntheticDockerignore {
    path: PathBuf,
}

impl SyntheticDockerignore {
    pub fn ensure(
        context: &Path,
        rules: &[String],
        tracker: &ResourceTracker,
    ) -> std::io::Result<Option<Self>> {
        let path = context.join(".dockerignore");
        if path.exists() {
            return Ok(None);
        }
        fs::write(&path, rules.join("\n"))?;
        tracker.register(&path);
        debug!("synthesized {}", path.display());
        Ok(Some(Self { path }))
    }
}

impl Drop for SyntheticDockerignore {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

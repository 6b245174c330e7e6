//! ビルドコンテキストのアーカイブ化
//!
//! Docker API へ送るため、コンテキストディレクトリを tar.gz として
//! メモリ上に構築します。ラベル付与用の1命令だけのコンテキストも
//! ここで作ります。

use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// コンテキストディレクトリ全体を tar.gz アーカイブにする
pub fn create_context(context_path: &Path) -> Result<Vec<u8>> {
    tracing::debug!("creating build context from: {}", context_path.display());

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);
        tar.append_dir_all(".", context_path).map_err(BuildError::Io)?;
        tar.finish().map_err(BuildError::Io)?;
    }

    tracing::debug!("build context created: {} bytes", archive_data.len());
    Ok(archive_data)
}

/// ラベル付与用のエフェメラルコンテキストを作る
///
/// `FROM <ラベル無しイメージ>` と `LABEL ...` の2命令だけの
/// Dockerfile を含む tar.gz を返します。
pub fn create_label_context(base_image: &str, labels: &[String]) -> Result<Vec<u8>> {
    let dockerfile = format!("FROM {}\nLABEL {}\n", base_image, labels.join(" "));

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        let content = dockerfile.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_path("Dockerfile").map_err(BuildError::Io)?;
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, content).map_err(BuildError::Io)?;
        tar.finish().map_err(BuildError::Io)?;
    }

    Ok(archive_data)
}

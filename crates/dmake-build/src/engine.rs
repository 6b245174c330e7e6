//! イメージエンジン（Docker デーモン）クライアント
//!
//! bollard のストリーミング API を包み、パイプラインが必要とする
//! 操作だけを公開します。ビルド・プッシュのイベントストリームは
//! 最後まで消費し、エラーイベントを見つけた時点で失敗にします。

use crate::error::{BuildError, Result};
use bollard::Docker;
use bollard::models::{BuildInfo, BuildInfoAux};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use tracing::debug;

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// コンテキストアーカイブからイメージをビルドし、イメージIDを返す
    ///
    /// ストリーム中の errorDetail はその場で [`BuildError::BuildFailed`]。
    /// イメージIDは最後の "Successfully built" 行（または aux レコード）
    /// から取り出します。
    pub async fn build(
        &self,
        name: &str,
        context_tar: Vec<u8>,
        dockerfile: &str,
        remove_intermediate: bool,
    ) -> Result<String> {
        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile,
            rm: remove_intermediate,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context_tar));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        let mut image_id: Option<String> = None;
        while let Some(msg) = stream.next().await {
            let info = msg?;
            if let Some(id) = Self::handle_build_event(name, &info)? {
                image_id = Some(id);
            }
        }

        image_id.ok_or_else(|| {
            BuildError::BuildFailed(format!("{name}: build finished without an image id"))
        })
    }

    /// ビルドイベント1件を処理し、イメージIDが判明したら返す
    fn handle_build_event(name: &str, info: &BuildInfo) -> Result<Option<String>> {
        if let Some(error_detail) = &info.error_detail {
            let message = error_detail
                .message
                .clone()
                .unwrap_or_else(|| "unknown build error".to_string());
            return Err(BuildError::BuildFailed(message));
        }
        if let Some(error) = &info.error {
            return Err(BuildError::BuildFailed(error.clone()));
        }

        let mut image_id = None;
        if let Some(line) = &info.stream {
            debug!("{}: {}", name, line.trim_end());
            if line.contains("Successfully built") {
                image_id = line.split_whitespace().last().map(String::from);
            }
        }
        match &info.aux {
            Some(BuildInfoAux::Default(id)) => {
                if let Some(id) = &id.id {
                    image_id = Some(id.clone());
                }
            }
            _ => {}
        }
        Ok(image_id)
    }

    pub async fn tag(&self, image: &str, repo: &str, tag: &str) -> Result<()> {
        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions { repo, tag };
        self.docker.tag_image(image, Some(options)).await?;
        Ok(())
    }

    /// `repo:tag` をレジストリへプッシュする
    ///
    /// ストリーム中のエラーイベントはリポジトリとタグを添えて
    /// [`BuildError::PushFailed`] になります。
    pub async fn push(&self, name: &str, repo: &str, tag: &str) -> Result<()> {
        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions { tag };
        #[allow(deprecated)]
        let mut stream = self.docker.push_image(repo, Some(options), None);

        while let Some(result) = stream.next().await {
            let info = result
                .map_err(|e| BuildError::PushFailed(format!("error in push {repo}:{tag}: {e}")))?;
            if let Some(error) = info.error {
                return Err(BuildError::PushFailed(format!(
                    "error in push {repo}:{tag}: {error}"
                )));
            }
            if let Some(status) = info.status {
                debug!("{}: {}", name, status);
            }
        }
        Ok(())
    }

    /// 抽出用の一時コンテナを作る（起動はしない）
    pub async fn create_container(&self, image: &str) -> Result<String> {
        #[allow(deprecated)]
        let config = bollard::container::Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["true".to_string()]),
            ..Default::default()
        };
        #[allow(deprecated)]
        let response = self
            .docker
            .create_container(
                None::<bollard::container::CreateContainerOptions<String>>,
                config,
            )
            .await?;
        Ok(response.id)
    }

    /// コンテナ内のパスを tar アーカイブとして取得する
    pub async fn get_archive(&self, container_id: &str, path: &str) -> Result<Vec<u8>> {
        #[allow(deprecated)]
        let options = bollard::container::DownloadFromContainerOptions {
            path: path.to_string(),
        };
        #[allow(deprecated)]
        let mut stream = self
            .docker
            .download_from_container(container_id, Some(options));

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk?);
        }
        Ok(archive)
    }

    pub async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .remove_container(
                container_id,
                None::<bollard::query_parameters::RemoveContainerOptions>,
            )
            .await?;
        Ok(())
    }
}

//! ターゲット1つ分のビルドパイプライン
//!
//! `Pending → Built → Labeled → Extracted → Tagged → Pushed` の順で
//! イメージの構築・ラベル付与・ファイル抽出・タグ付け・プッシュを
//! 進めます。ラベルや抽出ルールが無いフェーズはスキップされます
//! （失敗扱いにはなりません）。どのフェーズの失敗もこのターゲットを
//! 打ち切り、オーケストレータが実行全体を中断します。

use crate::context;
use crate::engine::DockerEngine;
use crate::error::{BuildError, Result};
use crate::scope::{RewrittenDockerfile, SyntheticDockerignore};
use crate::tracker::ResourceTracker;
use dmake_core::model::BuildTarget;
use dmake_core::template::{self, TemplateArgs};
use dmake_core::DmakeError;
use std::fmt;
use tracing::{info, warn};

/// パイプラインの進行フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Built,
    Labeled,
    Extracted,
    Tagged,
    Pushed,
}

pub struct BuildPipeline<'a> {
    target: BuildTarget,
    engine: &'a DockerEngine,
    tracker: &'a ResourceTracker,
    phase: Phase,
    /// 直近の進捗テキスト（診断・表示用、後勝ち）
    progress: String,
    unlabeled_image_id: Option<String>,
    final_image_id: Option<String>,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(target: BuildTarget, engine: &'a DockerEngine, tracker: &'a ResourceTracker) -> Self {
        Self {
            target,
            engine,
            tracker,
            phase: Phase::Pending,
            progress: String::new(),
            unlabeled_image_id: None,
            final_image_id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// ラベル無しイメージのID（rewrite_from の解決に使う）
    pub fn unlabeled_image_id(&self) -> Option<&str> {
        self.unlabeled_image_id.as_deref()
    }

    pub fn final_image_id(&self) -> Option<&str> {
        self.final_image_id.as_deref()
    }

    /// ビルド本体: イメージ構築 → ラベル付与 → ファイル抽出
    pub async fn build(&mut self) -> Result<()> {
        self.update_progress("building".to_string());
        let unlabeled = self.build_image().await?;
        self.unlabeled_image_id = Some(unlabeled.clone());
        self.phase = Phase::Built;

        if self.target.labels.is_empty() {
            self.final_image_id = Some(unlabeled);
        } else {
            self.update_progress("attaching labels".to_string());
            let labeled = self.attach_labels(&unlabeled).await?;
            self.final_image_id = Some(labeled);
            self.phase = Phase::Labeled;
        }
        self.update_progress(format!(
            "build succeed: {}",
            self.final_image_id.as_deref().unwrap_or_default()
        ));

        if !self.target.extract.is_empty() {
            self.update_progress("extracting archives".to_string());
            self.extract_contents().await?;
            self.phase = Phase::Extracted;
            self.update_progress("extracting archives succeed".to_string());
        }
        Ok(())
    }

    /// 全プッシュルールのタグテンプレートを解決してタグを付ける
    ///
    /// テンプレートが未定義の引数を参照していても、そのルールの
    /// ポリシーがプッシュ不要なら警告すら出しません。
    pub async fn tag(&mut self, args: &TemplateArgs) -> Result<()> {
        let final_image = self.require_final_image()?;
        let pushes = self.target.pushes.clone();
        for rule in &pushes {
            let need_push = rule.mode.need_push(args);
            match template::render(&rule.tag_template, args) {
                Ok(tag_name) => {
                    self.engine.tag(&final_image, &rule.repo, &tag_name).await?;
                    self.update_progress(format!("tag added: {}:{}", rule.repo, tag_name));
                }
                Err(DmakeError::UndefinedArgument(name)) => {
                    if need_push {
                        warn!("invalid tag_template for this build: {}", name);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.phase = Phase::Tagged;
        Ok(())
    }

    /// ポリシーが真のルールだけをプッシュする
    ///
    /// ここでの引数未定義は致命的です。
    pub async fn push(&mut self, args: &TemplateArgs) -> Result<()> {
        let pushes = self.target.pushes.clone();
        for rule in &pushes {
            if !rule.mode.need_push(args) {
                continue;
            }
            let tag_name = template::render(&rule.tag_template, args).map_err(|_| {
                BuildError::PushFailed(format!(
                    "can not get tag name for tag_template: {}",
                    rule.tag_template
                ))
            })?;

            self.update_progress(format!("pushing to {}:{}", rule.repo, tag_name));
            self.engine
                .push(&self.target.name, &rule.repo, &tag_name)
                .await?;
            self.update_progress(format!("pushed to {}:{}", rule.repo, tag_name));
        }
        self.phase = Phase::Pushed;
        Ok(())
    }

    fn update_progress(&mut self, progress: String) {
        info!("{}: {}", self.target.name, progress);
        self.progress = progress;
    }

    fn require_final_image(&self) -> Result<String> {
        self.final_image_id.clone().ok_or_else(|| {
            BuildError::BuildFailed(format!("{}: no image has been built yet", self.target.name))
        })
    }

    /// コンテキストを整えてイメージを1つビルドする
    ///
    /// `.dockerignore` が無ければ合成し、rewrite_from が解決済みなら
    /// Dockerfile の FROM をビルドの間だけ書き換えます。ガードの
    /// Drop により、どの経路で抜けても元の状態に復元されます。
    async fn build_image(&mut self) -> Result<String> {
        let _ignore = SyntheticDockerignore::ensure(
            &self.target.context,
            &self.target.ignore_rules,
            self.tracker,
        )?;

        let dockerfile_path = self.target.context.join(&self.target.dockerfile);
        let _rewrite = match &self.target.rewrite_from {
            Some(base_image) => Some(RewrittenDockerfile::rewrite(&dockerfile_path, base_image)?),
            None => None,
        };

        let archive = context::create_context(&self.target.context)?;
        self.engine
            .build(
                &self.target.name,
                archive,
                &self.target.dockerfile,
                self.target.remove_intermediate,
            )
            .await
    }

    /// ラベル無しイメージを基に LABEL 命令だけのビルドを行う
    async fn attach_labels(&mut self, unlabeled: &str) -> Result<String> {
        let archive = context::create_label_context(unlabeled, &self.target.labels)?;
        let labeled = self
            .engine
            .build(
                &self.target.name,
                archive,
                "Dockerfile",
                self.target.remove_intermediate,
            )
            .await?;
        let labels = self.target.labels.clone();
        for label in labels {
            self.update_progress(format!("label added: {label}"));
        }
        Ok(labeled)
    }

    /// 一時コンテナ経由でイメージからファイルを取り出す
    ///
    /// コンテナは抽出の成否に関わらず必ず削除します。
    async fn extract_contents(&mut self) -> Result<()> {
        let final_image = self.require_final_image()?;
        let container_id = self.engine.create_container(&final_image).await?;

        let extraction = self.run_extraction(&container_id).await;
        let removal = self.engine.remove_container(&container_id).await;
        extraction?;
        removal
    }

    async fn run_extraction(&mut self, container_id: &str) -> Result<()> {
        let rules = self.target.extract.clone();
        for rule in &rules {
            let archive = self.engine.get_archive(container_id, &rule.src).await?;
            if let Some(parent) = rule.dst.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&rule.dst, archive)?;
            self.tracker.register(&rule.dst);
            self.update_progress(format!(
                "extracted {} to {}",
                rule.src,
                rule.dst.display()
            ));
        }
        Ok(())
    }
}

impl fmt::Display for BuildPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Build: {}({})", self.target.name, self.progress)
    }
}

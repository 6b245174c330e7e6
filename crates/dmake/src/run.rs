//! ビルド実行のオーケストレーション
//!
//! 設定ロード → 依存グラフ解決 → トポロジカル順に各ターゲットの
//! パイプラインを直列実行します。エラーが出た時点で残りの
//! ターゲットには手を付けず中断します（フェイルファスト）。

use anyhow::Context;
use colored::Colorize;
use dmake_build::{BuildPipeline, DockerEngine, ResourceTracker};
use dmake_core::model::BuildTarget;
use dmake_core::{config, template, DependencyGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub struct RunOptions {
    pub builds: Vec<String>,
    pub file: PathBuf,
    pub remove_intermediate: bool,
    pub dry_run: bool,
    pub no_push: bool,
}

pub async fn run(options: RunOptions, tracker: &ResourceTracker) -> anyhow::Result<()> {
    let config = config::load(&options.file)
        .with_context(|| format!("failed to load {}", options.file.display()))?;

    // テンプレート引数は実行ごとに一度だけ解決し、参照で配る
    let tag_args = template::tag_template_args(&config.tag_names);
    let label_args = template::label_template_args(&config.tag_names);

    let graph = DependencyGraph::new(config.dependency_map());
    let build_order = graph.sorted_order()?;

    let mut targets: BTreeMap<String, BuildTarget> = BTreeMap::new();
    for (name, entry) in &config.builds {
        let target = BuildTarget::from_entry(name, entry, &label_args, options.remove_intermediate)
            .with_context(|| format!("invalid build '{name}'"))?;
        targets.insert(name.clone(), target);
    }

    let wants: BTreeSet<String> = if options.builds.is_empty() {
        build_order.iter().cloned().collect()
    } else {
        graph.expand(&options.builds)?
    };

    if options.dry_run {
        for name in &build_order {
            if let Some(target) = targets.get(name) {
                if wants.contains(name) {
                    target.dryrun();
                }
            }
        }
        return Ok(());
    }

    let engine = DockerEngine::connect().context("failed to connect to the docker daemon")?;

    // 完了したビルドのラベル無しイメージID（rewrite_from の解決に使う）
    let mut completed: BTreeMap<String, String> = BTreeMap::new();

    for name in &build_order {
        if !wants.contains(name) {
            continue;
        }
        let Some(mut target) = targets.remove(name) else {
            continue;
        };

        if let Some(rewrite_from) = target.rewrite_from.clone() {
            let image_id = completed.get(&rewrite_from).with_context(|| {
                format!("rewrite_from target '{rewrite_from}' has not been built before '{name}'")
            })?;
            target.rewrite_from = Some(image_id.clone());
        }

        println!("{} {}", "▶".green(), name.bold());
        let mut pipeline = BuildPipeline::new(target, &engine, tracker);
        pipeline
            .build()
            .await
            .with_context(|| format!("failed to build {name}"))?;
        pipeline
            .tag(&tag_args)
            .await
            .with_context(|| format!("failed to tag {name}"))?;

        if !options.no_push {
            pipeline
                .push(&tag_args)
                .await
                .with_context(|| format!("failed to push {name}"))?;
        }

        if let Some(image_id) = pipeline.unlabeled_image_id() {
            completed.insert(name.clone(), image_id.to_string());
        }
        println!("  {} {}", "✓".green(), pipeline);
    }

    Ok(())
}

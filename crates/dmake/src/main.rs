mod run;

use clap::Parser;
use dmake_build::ResourceTracker;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dmake")]
#[command(version)]
#[command(about = "build docker images in a simpler way", long_about = None)]
struct Cli {
    /// 実行するビルド名（省略時は全ビルド）
    builds: Vec<String>,

    /// 設定ファイルのパス
    #[arg(short = 'f', long = "file", default_value = ".docker-make.yml")]
    file: PathBuf,

    /// 詳細ログを出力する
    #[arg(short = 'd', long = "detailed")]
    detailed: bool,

    /// 中間コンテナを削除する
    #[arg(short = 'r', long = "remove")]
    remove: bool,

    /// docker コマンドを表示するだけで実行しない
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// ビルドのみ行い、イメージをプッシュしない
    #[arg(long = "no-push")]
    no_push: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.detailed {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    let options = run::RunOptions {
        builds: cli.builds,
        file: cli.file,
        remove_intermediate: cli.remove,
        dry_run: cli.dry_run,
        no_push: cli.no_push,
    };

    // クリーンアップは成否に関わらず終了前に必ず一度だけ走らせる
    let tracker = ResourceTracker::new();
    let result = run::run(options, &tracker).await;
    tracker.clean_all();

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

//! dmake のコア機能
//!
//! YAML設定のロードとバリデーション、ビルド依存グラフの解決、
//! タグ/ラベルテンプレート引数の生成を提供します。
//! Docker への依存はこのクレートには含まれません（dmake-build 側）。

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod tagname;
pub mod template;

pub use config::Config;
pub use error::{DmakeError, Result};
pub use graph::DependencyGraph;
pub use model::{BuildTarget, ExtractRule, PushMode, PushRule};
pub use template::TemplateArgs;

//! dmake の Docker イメージビルド機能
//!
//! bollard 経由のイメージエンジン操作、ビルドコンテキストの
//! アーカイブ化、ターゲット1つ分のビルドパイプライン、
//! 一時ファイルのクリーンアップを提供します。

pub mod context;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod scope;
pub mod tracker;

pub use engine::DockerEngine;
pub use error::{BuildError, Result};
pub use pipeline::{BuildPipeline, Phase};
pub use tracker::ResourceTracker;

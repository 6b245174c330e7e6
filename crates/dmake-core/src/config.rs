//! `.docker-make.yml` のロードとバリデーション
//!
//! YAML自体のパース失敗は Configuration、スキーマ違反
//! （builds の欠落・型違い・未定義の依存先）は Validation として
//! 区別します。どちらの場合もビルドには一切手を付けません。

use crate::error::{DmakeError, Result};
use crate::template::TagNameEntry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// `builds` 配下の1エントリ（生の設定値）
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildEntry {
    pub context: String,
    pub dockerfile: String,
    #[serde(default)]
    pub dockerignore: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub extract: Vec<String>,
    #[serde(default)]
    pub pushes: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub rewrite_from: Option<String>,
    #[serde(default)]
    pub remove_intermediate: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub builds: BTreeMap<String, BuildEntry>,
    pub tag_names: Vec<TagNameEntry>,
}

/// 設定ファイルをロードして検証する
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DmakeError::Configuration(format!("{}: {}", path.display(), e)))?;
    let document: serde_yaml::Value = serde_yaml::from_str(&content)
        .map_err(|e| DmakeError::Configuration(format!("{}: {}", path.display(), e)))?;

    let builds_value = document
        .get("builds")
        .ok_or_else(|| DmakeError::Validation("no builds specified".to_string()))?;
    if !builds_value.is_mapping() {
        return Err(DmakeError::Validation(
            "builds should be a mapping".to_string(),
        ));
    }

    let mut builds = BTreeMap::new();
    if let Some(mapping) = builds_value.as_mapping() {
        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| {
                    DmakeError::Validation(format!("build name should be a string: {key:?}"))
                })?
                .to_string();
            let entry: BuildEntry = serde_yaml::from_value(value.clone())
                .map_err(|e| DmakeError::Validation(format!("invalid build '{name}': {e}")))?;
            builds.insert(name, entry);
        }
    }

    // 依存先は全て builds に存在しなければならない
    for (name, entry) in &builds {
        for dep in &entry.depends_on {
            if !builds.contains_key(dep) {
                return Err(DmakeError::Validation(format!(
                    "{name} depends on {dep}, which is not present in the current configuration"
                )));
            }
        }
    }

    let tag_names = match document.get("tag-names") {
        Some(value) => serde_yaml::from_value(value.clone())
            .map_err(|e| DmakeError::Validation(format!("invalid tag-names: {e}")))?,
        None => Vec::new(),
    };

    debug!(
        "loaded {} builds and {} tag-names entries from {}",
        builds.len(),
        tag_names.len(),
        path.display()
    );
    Ok(Config { builds, tag_names })
}

impl Config {
    /// ビルド名 → 依存先の対応（グラフ構築用）
    pub fn dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        self.builds
            .iter()
            .map(|(name, entry)| (name.clone(), entry.depends_on.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docker-make.yml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_minimal() {
        let (_dir, path) = write_config(
            r#"
builds:
  base:
    context: /
    dockerfile: Dockerfile
"#,
        );
        let config = load(&path).unwrap();
        assert_eq!(config.builds.len(), 1);
        let base = &config.builds["base"];
        assert_eq!(base.dockerfile, "Dockerfile");
        assert!(base.depends_on.is_empty());
        assert!(config.tag_names.is_empty());
    }

    #[test]
    fn test_load_full_entry() {
        let (_dir, path) = write_config(
            r#"
builds:
  app:
    context: /app
    dockerfile: Dockerfile
    depends_on:
      - base
    rewrite_from: base
    pushes:
      - 'always=registry.example.com/app:{date}'
    labels:
      - 'com.example.version={scommitid}'
    extract:
      - '/out.tar:artifacts/out.tar'
  base:
    context: /
    dockerfile: Dockerfile.base
tag-names:
  - name: build_time
    type: datetime
    value: '%Y%m%d%H%M'
"#,
        );
        let config = load(&path).unwrap();
        assert_eq!(config.builds["app"].depends_on, vec!["base"]);
        assert_eq!(config.builds["app"].rewrite_from.as_deref(), Some("base"));
        assert_eq!(config.tag_names.len(), 1);
        assert_eq!(config.tag_names[0].name.as_deref(), Some("build_time"));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("nope.yml"));
        assert!(matches!(result, Err(DmakeError::Configuration(_))));
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        let (_dir, path) = write_config("builds: [unclosed");
        assert!(matches!(load(&path), Err(DmakeError::Configuration(_))));
    }

    #[test]
    fn test_missing_builds_is_validation_error() {
        let (_dir, path) = write_config("tag-names: []");
        match load(&path) {
            Err(DmakeError::Validation(msg)) => assert!(msg.contains("no builds")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_non_mapping_builds_is_validation_error() {
        let (_dir, path) = write_config("builds:\n  - just\n  - a\n  - list\n");
        match load(&path) {
            Err(DmakeError::Validation(msg)) => assert!(msg.contains("mapping")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_dangling_dependency_is_validation_error() {
        let (_dir, path) = write_config(
            r#"
builds:
  app:
    context: /
    dockerfile: Dockerfile
    depends_on:
      - ghost
"#,
        );
        match load(&path) {
            Err(DmakeError::Validation(msg)) => {
                assert!(msg.contains("app") && msg.contains("ghost"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_dependency_map() {
        let (_dir, path) = write_config(
            r#"
builds:
  app:
    context: /
    dockerfile: Dockerfile
    depends_on: [base]
  base:
    context: /
    dockerfile: Dockerfile
"#,
        );
        let config = load(&path).unwrap();
        let deps = config.dependency_map();
        assert_eq!(deps["app"], vec!["base"]);
        assert!(deps["base"].is_empty());
    }
}

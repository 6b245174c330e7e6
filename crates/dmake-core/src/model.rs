//! ビルドターゲットのモデル
//!
//! 検証済み設定からイミュータブルな [`BuildTarget`] を構築します。
//! 例外は `rewrite_from` のみで、依存先のビルド完了後に
//! オーケストレータがターゲット名→イメージIDへ一度だけ書き換えます。

use crate::config::BuildEntry;
use crate::error::{DmakeError, Result};
use crate::template::{self, TemplateArgs};
use std::path::PathBuf;
use tracing::warn;

/// `.dockerignore` の番兵ルール。常に含まれる。
const DOCKERIGNORE_SENTINEL: &str = ".dockerignore";

/// プッシュ可否を決めるポリシートークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    Always,
    Never,
    OnTag,
    OnBranch(String),
    /// 未知のトークン。決してプッシュしない。
    Unknown(String),
}

impl PushMode {
    pub fn parse(token: &str) -> Self {
        match token {
            "always" => PushMode::Always,
            "never" => PushMode::Never,
            "on_tag" => PushMode::OnTag,
            _ => match token.strip_prefix("on_branch:") {
                Some(branch) => PushMode::OnBranch(branch.to_string()),
                None => PushMode::Unknown(token.to_string()),
            },
        }
    }

    /// タグコンテキストの引数を見てプッシュすべきかを判定
    pub fn need_push(&self, args: &TemplateArgs) -> bool {
        match self {
            PushMode::Always => true,
            PushMode::Never => false,
            PushMode::OnTag => args.get("git_tag").is_some_and(|tag| !tag.is_empty()),
            PushMode::OnBranch(branch) => args.get("git_branch") == Some(branch.as_str()),
            PushMode::Unknown(_) => false,
        }
    }
}

/// `mode=repo:tag_template` から作られるプッシュルール
#[derive(Debug, Clone)]
pub struct PushRule {
    pub mode: PushMode,
    pub repo: String,
    pub tag_template: String,
}

/// イメージから取り出すパスと書き出し先
#[derive(Debug, Clone)]
pub struct ExtractRule {
    pub src: String,
    pub dst: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub name: String,
    /// カレントディレクトリ基準に解決済みのビルドコンテキスト
    pub context: PathBuf,
    /// コンテキスト相対の Dockerfile パス
    pub dockerfile: String,
    pub ignore_rules: Vec<String>,
    pub depends_on: Vec<String>,
    /// 設定時はターゲット名、依存のビルド完了後はイメージID
    pub rewrite_from: Option<String>,
    pub pushes: Vec<PushRule>,
    /// ラベルコンテキストで解決済みの `key="value"` 形式
    pub labels: Vec<String>,
    pub extract: Vec<ExtractRule>,
    pub remove_intermediate: bool,
}

impl BuildTarget {
    /// 設定エントリからターゲットを構築
    ///
    /// ラベルテンプレートはこの時点で解決されます。未定義の引数を
    /// 参照するラベルは警告してスキップ（ビルドは止めない）。
    pub fn from_entry(
        name: &str,
        entry: &BuildEntry,
        label_args: &TemplateArgs,
        remove_intermediate: bool,
    ) -> Result<Self> {
        let context = std::env::current_dir()?.join(entry.context.trim_start_matches('/'));

        let mut ignore_rules = entry.dockerignore.clone();
        if !ignore_rules.iter().any(|rule| rule == DOCKERIGNORE_SENTINEL) {
            ignore_rules.push(DOCKERIGNORE_SENTINEL.to_string());
        }

        let pushes = entry
            .pushes
            .iter()
            .map(|line| parse_push_rule(line))
            .collect::<Result<Vec<_>>>()?;

        let mut labels = Vec::new();
        for label_template in &entry.labels {
            let (key, value_template) = label_template.split_once('=').ok_or_else(|| {
                DmakeError::Configuration(format!("invalid label template: {label_template}"))
            })?;
            match template::render(value_template, label_args) {
                Ok(value) => labels.push(format!("{key}=\"{value}\"")),
                Err(DmakeError::UndefinedArgument(_)) => {
                    warn!("invalid label template: {}", label_template);
                }
                Err(e) => return Err(e),
            }
        }

        let extract = entry
            .extract
            .iter()
            .map(|item| {
                let (src, dst) = item.split_once(':').ok_or_else(|| {
                    DmakeError::Configuration(format!("invalid extract rule: {item}"))
                })?;
                Ok(ExtractRule {
                    src: src.to_string(),
                    dst: context.join(dst),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            context,
            dockerfile: entry.dockerfile.clone(),
            ignore_rules,
            depends_on: entry.depends_on.clone(),
            rewrite_from: entry.rewrite_from.clone(),
            pushes,
            labels,
            extract,
            remove_intermediate: remove_intermediate || entry.remove_intermediate.unwrap_or(false),
        })
    }

    /// 実行せずに等価な docker build コマンドラインを表示
    pub fn dryrun(&self) {
        let mut command = vec![
            "docker".to_string(),
            "build".to_string(),
            "-f".to_string(),
            self.dockerfile.clone(),
        ];
        for label in &self.labels {
            command.push("--label".to_string());
            command.push(label.clone());
        }
        if self.remove_intermediate {
            command.push("--rm".to_string());
        }
        command.push(self.context.display().to_string());
        println!("{}: {}", self.name, command.join(" "));
    }
}

fn parse_push_rule(line: &str) -> Result<PushRule> {
    let parsed = line.split_once('=').and_then(|(mode, rest)| {
        rest.rsplit_once(':')
            .map(|(repo, tag_template)| (mode, repo, tag_template))
    });
    let (mode, repo, tag_template) = parsed
        .ok_or_else(|| DmakeError::Configuration(format!("wrong format for push {line}")))?;
    Ok(PushRule {
        mode: PushMode::parse(mode),
        repo: repo.to_string(),
        tag_template: tag_template.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildEntry;

    fn entry() -> BuildEntry {
        BuildEntry {
            context: "/".to_string(),
            dockerfile: "Dockerfile".to_string(),
            dockerignore: Vec::new(),
            depends_on: Vec::new(),
            extract: Vec::new(),
            pushes: Vec::new(),
            labels: Vec::new(),
            rewrite_from: None,
            remove_intermediate: None,
        }
    }

    fn no_args() -> TemplateArgs {
        TemplateArgs::default()
    }

    #[test]
    fn test_push_mode_parse() {
        assert_eq!(PushMode::parse("always"), PushMode::Always);
        assert_eq!(PushMode::parse("never"), PushMode::Never);
        assert_eq!(PushMode::parse("on_tag"), PushMode::OnTag);
        assert_eq!(
            PushMode::parse("on_branch:release"),
            PushMode::OnBranch("release".to_string())
        );
        assert_eq!(
            PushMode::parse("whenever"),
            PushMode::Unknown("whenever".to_string())
        );
    }

    #[test]
    fn test_push_policy_table() {
        let with_tag = TemplateArgs::from_pairs([("git_tag", "1.2.3"), ("git_branch", "release")]);
        let without_tag = TemplateArgs::from_pairs([("git_branch", "master")]);

        assert!(PushMode::Always.need_push(&with_tag));
        assert!(PushMode::Always.need_push(&without_tag));
        assert!(!PushMode::Never.need_push(&with_tag));
        assert!(!PushMode::Never.need_push(&without_tag));
        assert!(PushMode::OnTag.need_push(&with_tag));
        assert!(!PushMode::OnTag.need_push(&without_tag));
        assert!(PushMode::OnBranch("release".into()).need_push(&with_tag));
        assert!(!PushMode::OnBranch("release".into()).need_push(&without_tag));
        assert!(!PushMode::Unknown("wat".into()).need_push(&with_tag));
    }

    #[test]
    fn test_parse_push_rule() {
        let rule = parse_push_rule("always=registry.example.com/app:{date}").unwrap();
        assert_eq!(rule.mode, PushMode::Always);
        assert_eq!(rule.repo, "registry.example.com/app");
        assert_eq!(rule.tag_template, "{date}");
    }

    #[test]
    fn test_parse_push_rule_repo_with_port() {
        // リポジトリ名にポートが含まれる場合は最後の : で分割される
        let rule = parse_push_rule("always=localhost:5000/app:{date}").unwrap();
        assert_eq!(rule.repo, "localhost:5000/app");
        assert_eq!(rule.tag_template, "{date}");
    }

    #[test]
    fn test_parse_push_rule_bad_format() {
        assert!(matches!(
            parse_push_rule("no-separators-here"),
            Err(DmakeError::Configuration(_))
        ));
        assert!(matches!(
            parse_push_rule("always=no-tag-template"),
            Err(DmakeError::Configuration(_))
        ));
    }

    #[test]
    fn test_dockerignore_sentinel_added() {
        let mut e = entry();
        e.dockerignore = vec!["target/".to_string()];
        let target = BuildTarget::from_entry("app", &e, &no_args(), false).unwrap();
        assert_eq!(target.ignore_rules, vec!["target/", ".dockerignore"]);

        // 既にある場合は重複しない
        let mut e = entry();
        e.dockerignore = vec![".dockerignore".to_string()];
        let target = BuildTarget::from_entry("app", &e, &no_args(), false).unwrap();
        assert_eq!(target.ignore_rules, vec![".dockerignore"]);
    }

    #[test]
    fn test_labels_rendered_and_quoted() {
        let mut e = entry();
        e.labels = vec!["com.example.commit={scommitid}".to_string()];
        let args = TemplateArgs::from_pairs([("scommitid", "5690336")]);
        let target = BuildTarget::from_entry("app", &e, &args, false).unwrap();
        assert_eq!(target.labels, vec![r#"com.example.commit="5690336""#]);
    }

    #[test]
    fn test_label_with_undefined_argument_skipped() {
        let mut e = entry();
        e.labels = vec![
            "known={scommitid}".to_string(),
            "unknown={missing}".to_string(),
        ];
        let args = TemplateArgs::from_pairs([("scommitid", "5690336")]);
        let target = BuildTarget::from_entry("app", &e, &args, false).unwrap();
        assert_eq!(target.labels.len(), 1);
    }

    #[test]
    fn test_label_without_separator_is_error() {
        let mut e = entry();
        e.labels = vec!["nokeyvalue".to_string()];
        assert!(matches!(
            BuildTarget::from_entry("app", &e, &no_args(), false),
            Err(DmakeError::Configuration(_))
        ));
    }

    #[test]
    fn test_extract_rules_join_context() {
        let mut e = entry();
        e.extract = vec!["/out.tar:artifacts/out.tar".to_string()];
        let target = BuildTarget::from_entry("app", &e, &no_args(), false).unwrap();
        assert_eq!(target.extract.len(), 1);
        assert_eq!(target.extract[0].src, "/out.tar");
        assert!(target.extract[0].dst.ends_with("artifacts/out.tar"));
        assert!(target.extract[0].dst.starts_with(&target.context));
    }

    #[test]
    fn test_invalid_extract_rule() {
        let mut e = entry();
        e.extract = vec!["no-colon".to_string()];
        assert!(matches!(
            BuildTarget::from_entry("app", &e, &no_args(), false),
            Err(DmakeError::Configuration(_))
        ));
    }

    #[test]
    fn test_remove_intermediate_from_cli_or_entry() {
        let target = BuildTarget::from_entry("app", &entry(), &no_args(), true).unwrap();
        assert!(target.remove_intermediate);

        let mut e = entry();
        e.remove_intermediate = Some(true);
        let target = BuildTarget::from_entry("app", &e, &no_args(), false).unwrap();
        assert!(target.remove_intermediate);

        let target = BuildTarget::from_entry("app", &entry(), &no_args(), false).unwrap();
        assert!(!target.remove_intermediate);
    }
}

//! タグ/ラベルテンプレート引数の生成
//!
//! git の情報や日付など、タグ・ラベルのテンプレートに渡す値を
//! 外部コマンドから収集します。引数セットは実行ごとに一度だけ
//! 構築し、参照で各コンポーネントへ渡します（プロセスワイドな
//! シングルトンは持ちません）。

use crate::error::{DmakeError, Result};
use crate::tagname;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Command;
use tracing::{debug, info, warn};

/// 解決済みテンプレート引数のイミュータブルなマッピング
#[derive(Debug, Clone, Default)]
pub struct TemplateArgs {
    args: BTreeMap<String, String>,
}

impl TemplateArgs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// テスト・固定値用のコンストラクタ
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            args: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 設定ファイルの `tag-names` エントリ
///
/// フィールドの欠落はロード時エラーにせず、ジェネレータ構築時に
/// 警告してスキップします。
#[derive(Debug, Clone, Deserialize)]
pub struct TagNameEntry {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<String>,
}

/// `tag-names` エントリが必須フィールドを全て持つか
pub fn validate_tag_name_entry(entry: &TagNameEntry) -> bool {
    entry.name.is_some() && entry.kind.is_some() && entry.value.is_some()
}

/// テンプレート引数を生成する1単位
pub trait ArgsGenerator {
    /// 解決できた (名前, 値) ペアを返す。失敗時は空。
    fn args(&self) -> Vec<(String, String)>;
}

/// 外部コマンドの標準出力を値とするジェネレータ
pub struct ExternalCmdGenerator {
    key: String,
    cmd: String,
    /// コマンド失敗時、この文字列が出力に含まれていれば WARN でなく INFO
    no_match_hint: Option<&'static str>,
}

impl ExternalCmdGenerator {
    pub fn new(key: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cmd: cmd.into(),
            no_match_hint: None,
        }
    }

    fn with_no_match_hint(mut self, hint: &'static str) -> Self {
        self.no_match_hint = Some(hint);
        self
    }

    /// コマンドを実行し、トリム済み標準出力を返す
    ///
    /// 非ゼロ終了・空出力は None（ビルドを止めない）。
    fn output(&self) -> Option<String> {
        let result = Command::new("sh").arg("-c").arg(&self.cmd).output();
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                warn!("failed to run {}: {}", self.cmd, e);
                return None;
            }
        };

        if !output.status.success() {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            // タグが1つも無い等、データが無いだけの失敗は警告に値しない
            match self.no_match_hint {
                Some(hint) if combined.contains(hint) => {
                    info!("failed to run {}: {}", self.cmd, combined.trim());
                }
                _ => {
                    warn!("failed to run {}: {}", self.cmd, combined.trim());
                }
            }
            return None;
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() { None } else { Some(value) }
    }
}

impl ArgsGenerator for ExternalCmdGenerator {
    fn args(&self) -> Vec<(String, String)> {
        match self.output() {
            Some(value) => vec![(self.key.clone(), value)],
            None => Vec::new(),
        }
    }
}

/// コミットID（フル + 7文字短縮形）
pub struct GitCommitGenerator;

impl ArgsGenerator for GitCommitGenerator {
    fn args(&self) -> Vec<(String, String)> {
        let inner = ExternalCmdGenerator::new("fcommitid", "git rev-parse HEAD");
        match inner.output() {
            Some(commit) => {
                let short: String = commit.chars().take(7).collect();
                vec![
                    ("fcommitid".to_string(), commit),
                    ("scommitid".to_string(), short),
                ]
            }
            None => Vec::new(),
        }
    }
}

/// 当日日付 `YYYYMMDD`（タグコンテキストのみ）
pub struct DateGenerator;

impl ArgsGenerator for DateGenerator {
    fn args(&self) -> Vec<(String, String)> {
        vec![(
            "date".to_string(),
            chrono::Local::now().format("%Y%m%d").to_string(),
        )]
    }
}

/// 任意フォーマットの現在時刻
pub struct DateTimeGenerator {
    key: String,
    format: String,
}

impl DateTimeGenerator {
    pub fn new(key: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
        }
    }
}

impl ArgsGenerator for DateTimeGenerator {
    fn args(&self) -> Vec<(String, String)> {
        vec![(
            self.key.clone(),
            chrono::Local::now().format(&self.format).to_string(),
        )]
    }
}

fn builtin_generators(include_date: bool) -> Vec<Box<dyn ArgsGenerator>> {
    let mut generators: Vec<Box<dyn ArgsGenerator>> = vec![
        Box::new(GitCommitGenerator),
        Box::new(ExternalCmdGenerator::new(
            "commitmsg",
            "git log --oneline|head -1",
        )),
        Box::new(ExternalCmdGenerator::new(
            "git_branch",
            "git rev-parse --abbrev-ref HEAD",
        )),
        Box::new(ExternalCmdGenerator::new(
            "git_tag",
            "git tag --contains HEAD|head -1",
        )),
        Box::new(
            ExternalCmdGenerator::new("git_describe", "git describe --tags")
                .with_no_match_hint("No names found"),
        ),
    ];
    if include_date {
        generators.push(Box::new(DateGenerator));
    }
    generators
}

/// `tag-names` 設定から追加ジェネレータを構築
///
/// 必須フィールドが欠けたエントリ・未知の type は警告してスキップ。
pub fn create_extra_generators(entries: &[TagNameEntry]) -> Vec<Box<dyn ArgsGenerator>> {
    let mut generators: Vec<Box<dyn ArgsGenerator>> = Vec::new();
    for entry in entries {
        if !validate_tag_name_entry(entry) {
            warn!("skipping malformed tag-names entry: {:?}", entry);
            continue;
        }
        let name = entry.name.clone().unwrap_or_default();
        let value = entry.value.clone().unwrap_or_default();
        match entry.kind.as_deref() {
            Some("datetime") => generators.push(Box::new(DateTimeGenerator::new(name, value))),
            Some("cmd") => generators.push(Box::new(ExternalCmdGenerator::new(name, value))),
            other => {
                warn!("unknown tag-names type {:?} for '{}'", other, name);
            }
        }
    }
    generators
}

fn collect_args(generators: &[Box<dyn ArgsGenerator>]) -> BTreeMap<String, String> {
    let mut args = BTreeMap::new();
    for generator in generators {
        for (key, value) in generator.args() {
            debug!("resolved template argument {}={}", key, value);
            args.insert(key, value);
        }
    }
    args
}

/// タグコンテキストの引数セットを解決
///
/// 全ての値はタグ名の文法に合わせて補正されます。
pub fn tag_template_args(extra: &[TagNameEntry]) -> TemplateArgs {
    let mut generators = builtin_generators(true);
    generators.extend(create_extra_generators(extra));
    let args = collect_args(&generators)
        .into_iter()
        .map(|(k, v)| {
            let sanitized = tagname::sanitize(Some(&v));
            (k, sanitized)
        })
        .collect();
    TemplateArgs { args }
}

/// ラベルコンテキストの引数セットを解決
///
/// `date` を含まず、値はタグ文法の補正ではなく LABEL 命令へ安全に
/// 埋め込むための二重引用符エスケープのみを行います。
pub fn label_template_args(extra: &[TagNameEntry]) -> TemplateArgs {
    let mut generators = builtin_generators(false);
    generators.extend(create_extra_generators(extra));
    let args = collect_args(&generators)
        .into_iter()
        .map(|(k, v)| (k, v.replace('"', "\\\"")))
        .collect();
    TemplateArgs { args }
}

/// `{name}` プレースホルダを解決済み引数で置換
///
/// `{{` と `}}` はリテラルの波括弧。未知の引数名は
/// [`DmakeError::UndefinedArgument`] になります。
pub fn render(template: &str, args: &TemplateArgs) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(DmakeError::Configuration(format!(
                                "unbalanced braces in template: {template}"
                            )));
                        }
                    }
                }
                match args.get(&name) {
                    Some(value) => out.push_str(value),
                    None => return Err(DmakeError::UndefinedArgument(name)),
                }
            }
            '}' => {
                return Err(DmakeError::Configuration(format!(
                    "unbalanced braces in template: {template}"
                )));
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

//! タグ名のバリデーションと補正
//!
//! Docker タグの制約:
//! - 先頭は英数字またはアンダースコア
//! - 2文字目以降は英数字・ピリオド・ハイフン・アンダースコア
//! - 128文字以下

pub const MAX_TAG_LENGTH: usize = 128;

/// 補正不能な値（空文字列・未解決）の置き換え先
const NULL_TAG: &str = "null";

fn is_valid_first_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// タグ名として合法かを判定
pub fn is_valid(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_TAG_LENGTH {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_valid_first_char(c) => {}
        _ => return false,
    }
    chars.all(is_valid_char)
}

/// 値をタグ名の文法に合わせて決定的に補正
///
/// 不正な文字は `_` に置き換え、空値は `null` に置き換え、
/// 128文字に切り詰めます。補正が行われた場合は warn ログを出します。
/// 冪等: 合法な名前はそのまま返ります。
pub fn sanitize(value: Option<&str>) -> String {
    let raw = match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            tracing::warn!("empty tag name replaced with '{}'", NULL_TAG);
            return NULL_TAG.to_string();
        }
    };

    let mut corrected = String::with_capacity(raw.len().min(MAX_TAG_LENGTH));
    for (i, c) in raw.chars().enumerate() {
        if i >= MAX_TAG_LENGTH {
            break;
        }
        let legal = if i == 0 {
            is_valid_first_char(c)
        } else {
            is_valid_char(c)
        };
        corrected.push(if legal { c } else { '_' });
    }

    if corrected != raw {
        tracing::warn!("tag name '{}' corrected to '{}'", raw, corrected);
    }
    corrected
}

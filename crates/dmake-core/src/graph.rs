//! ビルド依存グラフとトポロジカルソート
//!
//! `depends_on` の宣言から全体の実行順序を決めます。
//! 逆隣接（あるビルドに依存しているビルド群）をDFSで辿り、
//! 依存先が常に先に並ぶ全順序を生成します。再帰ではなく
//! 明示的なスタックと三色マーキングで探索するため、
//! 大きなグラフでもスタック深度の心配はありません。

use crate::error::{DmakeError, Result};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    /// 未訪問
    White,
    /// 探索中
    Gray,
    /// 探索完了
    Black,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// ビルド名 → 依存先ビルド名。BTreeMapなので反復順序は決定的。
    deps: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new(deps: BTreeMap<String, Vec<String>>) -> Self {
        Self { deps }
    }

    /// 依存先が常に依存元より前に来る全順序を返す
    ///
    /// 自己依存は [`DmakeError::SelfDependency`]、長さ2以上の循環は
    /// [`DmakeError::CircularDependency`]（探索中のビルド名を列挙）
    /// になります。
    pub fn sorted_order(&self) -> Result<Vec<String>> {
        // バリデーション済みの設定から作られる前提だが、ここでも
        // 未定義の依存先は弾いておく
        for (name, deps) in &self.deps {
            for dep in deps {
                if !self.deps.contains_key(dep) {
                    return Err(DmakeError::Validation(format!(
                        "{name} depends on {dep}, which is not present in the current configuration"
                    )));
                }
            }
        }

        // 逆隣接: dependents[n] = n に依存しているビルド群
        let mut dependents: BTreeMap<&str, Vec<&str>> =
            self.deps.keys().map(|name| (name.as_str(), Vec::new())).collect();
        for (name, deps) in &self.deps {
            for dep in deps {
                if let Some(list) = dependents.get_mut(dep.as_str()) {
                    list.push(name.as_str());
                }
            }
        }

        let mut colors: BTreeMap<&str, Color> =
            self.deps.keys().map(|name| (name.as_str(), Color::White)).collect();
        let mut finished: Vec<String> = Vec::with_capacity(self.deps.len());

        enum Step<'a> {
            Enter(&'a str),
            Exit(&'a str),
        }

        for root in self.deps.keys() {
            if colors[root.as_str()] != Color::White {
                continue;
            }
            let mut stack = vec![Step::Enter(root.as_str())];
            while let Some(step) = stack.pop() {
                match step {
                    Step::Enter(node) => {
                        match colors[node] {
                            Color::Black => continue,
                            Color::Gray => continue,
                            Color::White => {}
                        }
                        colors.insert(node, Color::Gray);
                        stack.push(Step::Exit(node));
                        for dependent in &dependents[node] {
                            match colors[*dependent] {
                                Color::White => stack.push(Step::Enter(dependent)),
                                Color::Gray => return Err(self.cycle_error(dependent, &colors)),
                                Color::Black => {}
                            }
                        }
                    }
                    Step::Exit(node) => {
                        colors.insert(node, Color::Black);
                        finished.push(node.to_string());
                    }
                }
            }
        }

        // 依存されているビルドほど後に完了するため、逆順が依存先優先の順序
        finished.reverse();
        Ok(finished)
    }

    fn cycle_error(&self, node: &str, colors: &BTreeMap<&str, Color>) -> DmakeError {
        let is_self_dependency = self
            .deps
            .get(node)
            .map(|deps| deps.iter().any(|dep| dep == node))
            .unwrap_or(false);
        if is_self_dependency {
            return DmakeError::SelfDependency(node.to_string());
        }
        let members: Vec<&str> = colors
            .iter()
            .filter(|(_, color)| **color == Color::Gray)
            .map(|(name, _)| *name)
            .collect();
        DmakeError::CircularDependency(members.join(" and "))
    }

    /// 選択されたビルド群とその依存の推移閉包を返す
    ///
    /// グラフに存在しない名前（直接指定・推移的に要求のいずれも）は
    /// [`DmakeError::UndefinedBuild`] になります。
    pub fn expand(&self, wanted: &[String]) -> Result<BTreeSet<String>> {
        let mut result = BTreeSet::new();
        let mut queue: Vec<String> = wanted.to_vec();
        while let Some(want) = queue.pop() {
            let deps = self
                .deps
                .get(&want)
                .ok_or_else(|| DmakeError::UndefinedBuild(want.clone()))?;
            if !result.insert(want) {
                continue;
            }
            for dep in deps {
                if !result.contains(dep) {
                    queue.push(dep.clone());
                }
            }
        }
        Ok(result)
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TOTAL_SELECTOR: &str = "总分";
pub const CURRICULUM_FILE: &str = "curriculum.json";

pub const BENCHMARK_RANK_WINDOW: i64 = 10;
pub const BENCHMARK_FALLBACK_SAMPLE: i64 = 20;
pub const DEFAULT_TREND_LIMIT: i64 = 10;
pub const DEFAULT_TARGET_RANK: i64 = 200;

/// Subjects every combination starts with.
pub const CORE_SUBJECTS: [&str; 3] = ["语文", "数学", "英语"];
/// Core subjects plus three electives.
pub const COMBINATION_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDef {
    pub name: String,
    pub full_mark: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationDef {
    pub name: String,
    pub subjects: Vec<String>,
}

/// Subject allow-list, full marks and leaderboard combinations.
///
/// Every score-rate computation takes its full mark from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub subjects: Vec<SubjectDef>,
    pub combinations: Vec<CombinationDef>,
    #[serde(default = "default_full_mark")]
    pub default_full_mark: f64,
}

fn default_full_mark() -> f64 {
    100.0
}

fn subject(name: &str, full_mark: f64) -> SubjectDef {
    SubjectDef {
        name: name.to_string(),
        full_mark,
    }
}

fn combination(name: &str, electives: [&str; 3]) -> CombinationDef {
    let mut subjects: Vec<String> = CORE_SUBJECTS.iter().map(|s| s.to_string()).collect();
    subjects.extend(electives.iter().map(|s| s.to_string()));
    CombinationDef {
        name: name.to_string(),
        subjects,
    }
}

impl Default for Curriculum {
    fn default() -> Self {
        Self {
            subjects: vec![
                subject("语文", 150.0),
                subject("数学", 150.0),
                subject("英语", 150.0),
                subject("物理", 100.0),
                subject("化学", 100.0),
                subject("生物", 100.0),
                subject("政治", 100.0),
                subject("历史", 100.0),
                subject("地理", 100.0),
                subject("技术", 100.0),
            ],
            combinations: vec![
                combination("物化生", ["物理", "化学", "生物"]),
                combination("物化地", ["物理", "化学", "地理"]),
                combination("物化政", ["物理", "化学", "政治"]),
                combination("史政地", ["历史", "政治", "地理"]),
            ],
            default_full_mark: default_full_mark(),
        }
    }
}

impl Curriculum {
    pub fn subject_names(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(|s| s.name.as_str())
    }

    pub fn is_subject(&self, name: &str) -> bool {
        self.subjects.iter().any(|s| s.name == name)
    }

    pub fn full_mark(&self, name: &str) -> f64 {
        self.subjects
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.full_mark)
            .unwrap_or(self.default_full_mark)
    }

    pub fn combination(&self, name: &str) -> Option<&CombinationDef> {
        self.combinations.iter().find(|c| c.name == name)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.subjects.is_empty() {
            anyhow::bail!("curriculum must list at least one subject");
        }
        for s in &self.subjects {
            if s.name.trim().is_empty() {
                anyhow::bail!("curriculum subject names must not be empty");
            }
            if !(s.full_mark > 0.0) {
                anyhow::bail!("full mark for {} must be positive", s.name);
            }
        }
        let builtin = Curriculum::default();
        for (i, c) in self.combinations.iter().enumerate() {
            if self.combinations[..i].iter().any(|prev| prev.name == c.name) {
                anyhow::bail!("combination {} is listed twice", c.name);
            }
            if let Some(unknown) = c.subjects.iter().find(|s| !self.is_subject(s)) {
                anyhow::bail!("combination {} names unknown subject {}", c.name, unknown);
            }
            let mut distinct: Vec<&str> = c.subjects.iter().map(String::as_str).collect();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() != COMBINATION_SIZE || distinct.len() != c.subjects.len() {
                anyhow::bail!(
                    "combination {} must list {} distinct subjects",
                    c.name,
                    COMBINATION_SIZE
                );
            }
            if let Some(core) = CORE_SUBJECTS.iter().find(|core| !distinct.contains(core)) {
                anyhow::bail!("combination {} is missing core subject {}", c.name, core);
            }
            if let Some(fixed) = builtin.combination(&c.name) {
                if fixed.subjects != c.subjects {
                    anyhow::bail!("combination {} cannot be redefined", c.name);
                }
            }
        }
        Ok(())
    }
}

pub fn load_curriculum(path: &Path) -> anyhow::Result<Curriculum> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read curriculum {}", path.to_string_lossy()))?;
    let curriculum: Curriculum = serde_json::from_str(&text)
        .with_context(|| format!("curriculum {} is invalid JSON", path.to_string_lossy()))?;
    curriculum.validate()?;
    Ok(curriculum)
}

/// Resolve the curriculum for a workspace: an explicit override path first,
/// then `curriculum.json` inside the workspace, then the built-in table.
/// A broken file never prevents the workspace from opening.
pub fn resolve_curriculum(workspace: &Path, override_path: Option<&PathBuf>) -> Curriculum {
    let candidate = override_path
        .cloned()
        .unwrap_or_else(|| workspace.join(CURRICULUM_FILE));
    if !candidate.is_file() {
        return Curriculum::default();
    }
    match load_curriculum(&candidate) {
        Ok(c) => {
            tracing::info!(path = %candidate.display(), subjects = c.subjects.len(), "loaded curriculum");
            c
        }
        Err(e) => {
            tracing::warn!(path = %candidate.display(), error = %format!("{e:#}"), "ignoring curriculum file");
            Curriculum::default()
        }
    }
}

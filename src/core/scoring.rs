//! Heuristic scoring of a discovered folder name against a project
//!
//! Signals are additive and the total is clamped to `0..=100`:
//!
//! | signal                                   | points              |
//! |------------------------------------------|---------------------|
//! | normalized project name inside folder    | 100                 |
//! | customer code substring                  | 60                  |
//! | part number substring                    | 60                  |
//! | each name keyword found                  | 15                  |
//! | keyword coverage                         | 40 × found / total  |
//! | each domain synonym pair                 | 20                  |

use crate::core::project::Project;

pub const MAX_SCORE: u8 = 100;

const NAME_MATCH: u32 = 100;
const CODE_MATCH: u32 = 60;
const KEYWORD_MATCH: u32 = 15;
const COVERAGE_BONUS: u32 = 40;
const SYNONYM_MATCH: u32 = 20;

/// Keywords too generic to count as evidence
const STOP_WORDS: &[&str] = &[
    "inspection",
    "project",
    "report",
    "test",
    "data",
    "new",
    "final",
    "the",
    "and",
    "项目",
    "检测",
    "报告",
    "测试",
    "数据",
];

/// Chinese engineering term and the English spellings used on the share drives
const SYNONYMS: &[(&str, &[&str])] = &[
    ("前梁", &["front", "frt"]),
    ("后梁", &["rear", "rr"]),
    ("减震塔", &["shock", "tower"]),
    ("探伤", &["xray", "x-ray", "inspection"]),
];

/// Score how well `folder_name` matches `project`
pub fn score(project: &Project, folder_name: &str) -> u8 {
    let folder_lower = folder_name.to_lowercase();
    let folder_norm = normalize(folder_name);
    let mut total: u32 = 0;

    let name_norm = normalize(&project.name);
    if !name_norm.is_empty() && folder_norm.contains(&name_norm) {
        total += NAME_MATCH;
    }

    for code in [project.customer_code(), project.part_number()].into_iter().flatten() {
        if folder_lower.contains(&code.to_lowercase()) {
            total += CODE_MATCH;
        }
    }

    let keywords = keywords(&project.name);
    if !keywords.is_empty() {
        let found = keywords
            .iter()
            .filter(|k| folder_lower.contains(k.as_str()))
            .count() as u32;
        total += found * KEYWORD_MATCH;
        total += COVERAGE_BONUS * found / keywords.len() as u32;
    }

    for (term, spellings) in SYNONYMS {
        if project.name.contains(term) && spellings.iter().any(|s| folder_lower.contains(s)) {
            total += SYNONYM_MATCH;
        }
    }

    total.min(MAX_SCORE as u32) as u8
}

/// Lower-case and drop whitespace, hyphens and underscores
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Distinctive lower-case keywords of a project name
fn keywords(name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in name.split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '/' | ',' | '，' | '、' | '(' | ')' | '（' | '）')) {
        let word = word.trim().to_lowercase();
        if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) || is_bare_year(&word) {
            continue;
        }
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

fn is_bare_year(word: &str) -> bool {
    word.len() == 4 && word.chars().all(|c| c.is_ascii_digit()) && (word.starts_with("19") || word.starts_with("20"))
}

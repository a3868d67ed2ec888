/// Paragraph-level change detection inside configured high-risk topics.
///
/// A hot section is a category label (e.g. "arbitration") with an ordered list of regex
/// patterns. A paragraph belongs to the category when any pattern matches it. Categories are
/// evaluated in configured order and the first one whose old/new paragraphs score below the
/// similarity threshold wins.
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::normalize::paragraphs;
use crate::similarity::SimilarityScorer;

/// Hot-section definition as written in the sources file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotSectionSpec {
    pub category: String,
    pub patterns: Vec<String>,
}

/// How to treat a category that has matching paragraphs on only one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewSectionPolicy {
    /// Score the present side against empty text.
    #[default]
    Score,
    /// Report the category as changed without comparing scores.
    Flag,
}

impl std::str::FromStr for NewSectionPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" => Ok(Self::Score),
            "flag" => Ok(Self::Flag),
            other => Err(AppError::Config(format!(
                "unknown new-section policy {other:?} (expected \"score\" or \"flag\")"
            ))),
        }
    }
}

/// A compiled hot section.
#[derive(Debug, Clone)]
pub struct HotSection {
    pub category: String,
    patterns: Vec<Regex>,
}

impl HotSection {
    /// Compile a spec. Patterns match case-insensitively.
    pub fn compile(spec: &HotSectionSpec) -> Result<Self, AppError> {
        let patterns = spec
            .patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        AppError::Config(format!(
                            "invalid pattern {p:?} for hot section {:?}: {e}",
                            spec.category
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            category: spec.category.clone(),
            patterns,
        })
    }

    fn matches(&self, paragraph: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(paragraph))
    }
}

/// Built-in table used when the sources file defines no `hotSections`.
pub fn default_hot_sections() -> Vec<HotSectionSpec> {
    let table: [(&str, &[&str]); 5] = [
        (
            "arbitration",
            &[
                r"\barbitrat",
                r"\bclass[- ]action\b",
                r"\bjury trial\b",
                r"\bdispute resolution\b",
            ],
        ),
        (
            "data_sharing",
            &[
                r"\bthird[- ]part(y|ies)\b",
                r"\b(share|sharing|sell|selling|disclose)\b.{0,40}\b(data|information)\b",
                r"\badvertising partners?\b",
            ],
        ),
        (
            "ai_training",
            &[
                r"\bmachine learning\b",
                r"\bartificial intelligence\b",
                r"\btrain(ing)?\b.{0,40}\b(models?|ai)\b",
            ],
        ),
        (
            "liability",
            &[
                r"\blimitation of liability\b",
                r"\bindemnif",
                r"\bliable\b",
            ],
        ),
        (
            "termination",
            &[r"\bterminat(e|ion)\b.{0,40}\b(account|access|service)\b"],
        ),
    ];
    table
        .iter()
        .map(|(category, patterns)| HotSectionSpec {
            category: category.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

/// The category that triggered and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct HotSectionHit {
    pub category: String,
    pub score: f64,
}

pub struct HotSectionMatcher {
    sections: Vec<HotSection>,
    threshold: f64,
    policy: NewSectionPolicy,
    scorer: Arc<dyn SimilarityScorer>,
}

impl HotSectionMatcher {
    pub fn new(
        sections: Vec<HotSection>,
        threshold: f64,
        policy: NewSectionPolicy,
        scorer: Arc<dyn SimilarityScorer>,
    ) -> Self {
        Self {
            sections,
            threshold,
            policy,
            scorer,
        }
    }

    /// Find the first hot section (in configured order) whose content changed.
    ///
    /// Takes raw texts: paragraph segmentation needs the blank-line boundaries that
    /// normalization erases. Each paragraph is normalized before matching and scoring.
    pub fn find_hot_section_change(&self, old_raw: &str, new_raw: &str) -> Option<HotSectionHit> {
        let old_paragraphs = paragraphs(old_raw);
        let new_paragraphs = paragraphs(new_raw);

        for section in &self.sections {
            let old_text = collect_matching(section, &old_paragraphs);
            let new_text = collect_matching(section, &new_paragraphs);

            let one_sided = old_text.is_empty() != new_text.is_empty();
            if old_text.is_empty() && new_text.is_empty() {
                continue;
            }

            let score = self.scorer.score(&old_text, &new_text);
            debug!(category = %section.category, score, one_sided, "hot section scored");

            if (one_sided && self.policy == NewSectionPolicy::Flag) || score < self.threshold {
                return Some(HotSectionHit {
                    category: section.category.clone(),
                    score,
                });
            }
        }
        None
    }
}

fn collect_matching(section: &HotSection, paragraphs: &[String]) -> String {
    paragraphs
        .iter()
        .filter(|p| section.matches(p))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substantive/non-substantive classification of a changed document.
///
/// The checks form an explicit ordered rule list, evaluated until the first rule fires:
/// 1. hot-section paragraph change
/// 2. normalized size delta above the percent-change threshold
/// 3. overall similarity below the similarity threshold
///
/// More specific checks come first. Normalized-equal inputs never reach the rules.
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::hot_section::{HotSection, HotSectionMatcher, NewSectionPolicy};
use crate::normalize::normalize;
use crate::similarity::SimilarityScorer;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.97;
pub const DEFAULT_PERCENT_CHANGE_THRESHOLD: f64 = 0.02;

/// Tunables carried into the classifier at construction.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub similarity_threshold: f64,
    pub percent_change_threshold: f64,
    pub hot_sections: Vec<HotSection>,
    pub new_section_policy: NewSectionPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeReason {
    HotSection { category: String },
    SizeDelta { fraction: f64 },
    SemanticDrift,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::HotSection { category } => {
                write!(f, "change detected in hot section: {category}")
            }
            ChangeReason::SizeDelta { fraction } => {
                write!(f, "document changed by {:.1}%", fraction * 100.0)
            }
            ChangeReason::SemanticDrift => f.write_str("semantic meaning changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeVerdict {
    pub substantive: bool,
    pub reason: Option<ChangeReason>,
    /// Score of the comparison that fired, when it was a similarity comparison.
    pub similarity: Option<f64>,
    /// Size-delta fraction, when the size check fired.
    pub size_delta: Option<f64>,
}

impl ChangeVerdict {
    pub fn not_substantive() -> Self {
        Self {
            substantive: false,
            reason: None,
            similarity: None,
            size_delta: None,
        }
    }

    fn substantive(reason: ChangeReason) -> Self {
        Self {
            substantive: true,
            reason: Some(reason),
            similarity: None,
            size_delta: None,
        }
    }
}

/// Both sides of one comparison, raw and normalized.
pub struct Comparison<'a> {
    pub old_raw: &'a str,
    pub new_raw: &'a str,
    pub old_norm: String,
    pub new_norm: String,
}

impl<'a> Comparison<'a> {
    pub fn new(old_raw: &'a str, new_raw: &'a str) -> Self {
        Self {
            old_raw,
            new_raw,
            old_norm: normalize(old_raw),
            new_norm: normalize(new_raw),
        }
    }
}

/// One check in the priority list. Returns a substantive verdict when it fires.
pub trait ChangeRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, cmp: &Comparison<'_>) -> Option<ChangeVerdict>;
}

pub struct HotSectionRule {
    matcher: HotSectionMatcher,
}

impl HotSectionRule {
    pub fn new(matcher: HotSectionMatcher) -> Self {
        Self { matcher }
    }
}

impl ChangeRule for HotSectionRule {
    fn name(&self) -> &'static str {
        "hot_section"
    }

    fn evaluate(&self, cmp: &Comparison<'_>) -> Option<ChangeVerdict> {
        let hit = self
            .matcher
            .find_hot_section_change(cmp.old_raw, cmp.new_raw)?;
        let mut verdict = ChangeVerdict::substantive(ChangeReason::HotSection {
            category: hit.category,
        });
        verdict.similarity = Some(hit.score);
        Some(verdict)
    }
}

pub struct SizeDeltaRule {
    threshold: f64,
}

impl SizeDeltaRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl ChangeRule for SizeDeltaRule {
    fn name(&self) -> &'static str {
        "size_delta"
    }

    fn evaluate(&self, cmp: &Comparison<'_>) -> Option<ChangeVerdict> {
        let delta = size_delta(&cmp.old_norm, &cmp.new_norm);
        if delta <= self.threshold {
            return None;
        }
        let mut verdict = ChangeVerdict::substantive(ChangeReason::SizeDelta { fraction: delta });
        verdict.size_delta = Some(delta);
        Some(verdict)
    }
}

pub struct SimilarityRule {
    threshold: f64,
    scorer: Arc<dyn SimilarityScorer>,
}

impl SimilarityRule {
    pub fn new(threshold: f64, scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self { threshold, scorer }
    }
}

impl ChangeRule for SimilarityRule {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn evaluate(&self, cmp: &Comparison<'_>) -> Option<ChangeVerdict> {
        let score = self.scorer.score(&cmp.old_norm, &cmp.new_norm);
        debug!(score, scorer = self.scorer.name(), "overall similarity");
        if score >= self.threshold {
            return None;
        }
        let mut verdict = ChangeVerdict::substantive(ChangeReason::SemanticDrift);
        verdict.similarity = Some(score);
        Some(verdict)
    }
}

/// Fractional length change between two normalized texts, in characters.
pub fn size_delta(old_norm: &str, new_norm: &str) -> f64 {
    let old_len = old_norm.chars().count();
    let new_len = new_norm.chars().count();
    old_len.abs_diff(new_len) as f64 / old_len.max(1) as f64
}

pub struct ChangeClassifier {
    rules: Vec<Box<dyn ChangeRule>>,
}

impl ChangeClassifier {
    /// Build the standard rule list from the config, sharing one scorer between the
    /// hot-section matcher and the overall similarity check.
    pub fn new(config: ClassifierConfig, scorer: Arc<dyn SimilarityScorer>) -> Self {
        let matcher = HotSectionMatcher::new(
            config.hot_sections,
            config.similarity_threshold,
            config.new_section_policy,
            Arc::clone(&scorer),
        );
        Self::with_rules(vec![
            Box::new(HotSectionRule::new(matcher)),
            Box::new(SizeDeltaRule::new(config.percent_change_threshold)),
            Box::new(SimilarityRule::new(config.similarity_threshold, scorer)),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn ChangeRule>>) -> Self {
        Self { rules }
    }

    /// Classify two raw versions known to differ byte-wise.
    pub fn classify(&self, old_raw: &str, new_raw: &str) -> ChangeVerdict {
        let cmp = Comparison::new(old_raw, new_raw);
        if cmp.old_norm == cmp.new_norm {
            debug!("normalized texts equal, change is cosmetic");
            return ChangeVerdict::not_substantive();
        }

        for rule in &self.rules {
            if let Some(verdict) = rule.evaluate(&cmp) {
                debug!(rule = rule.name(), "classification rule fired");
                return verdict;
            }
        }
        ChangeVerdict::not_substantive()
    }
}

//! Query intent classification and retrieval filter construction.
//!
//! Classification is an ordered, data-driven rule table: each rule is a set
//! of regex patterns for one intent family, evaluated top to bottom over
//! the trimmed, lower-cased message; the first matching rule wins and the
//! final rule is a catch-all. The function is pure — same message, same
//! classification — which keeps the table trivially testable.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use regex::RegexSet;
use serde::Serialize;

use crate::models::{Category, TruthLevel, now_epoch};

/// The nine recognized user intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserIntent {
    Fitment,
    Troubleshoot,
    Policy,
    Cost,
    Compare,
    Maintain,
    Do,
    Define,
    Choose,
}

impl UserIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIntent::Fitment => "fitment",
            UserIntent::Troubleshoot => "troubleshoot",
            UserIntent::Policy => "policy",
            UserIntent::Cost => "cost",
            UserIntent::Compare => "compare",
            UserIntent::Maintain => "maintain",
            UserIntent::Do => "do",
            UserIntent::Define => "define",
            UserIntent::Choose => "choose",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentClassification {
    pub user_intent: UserIntent,
    pub intent_family: &'static str,
    pub page_intent: &'static str,
    pub confidence: f64,
}

/// Retrieval constraints derived from the classified intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalFilters {
    pub truth_levels: Vec<TruthLevel>,
    /// When set, retrieval is restricted to these categories instead of the
    /// truth-level default.
    pub categories: Option<Vec<Category>>,
}

struct IntentRule {
    intent: UserIntent,
    family: &'static str,
    page: &'static str,
    patterns: &'static [&'static str],
}

/// Rule table in priority order; first match wins. Patterns run against the
/// trimmed, lower-cased message (accents preserved, so both spellings are
/// listed where users commonly drop them).
const RULES: &[IntentRule] = &[
    IntentRule {
        intent: UserIntent::Fitment,
        family: "compatibility",
        page: "product_fitment",
        patterns: &[
            r"compatib",
            r"pour (ma|mon) ",
            r"(ma|sa) voiture",
            r"mon v[eé]hicule",
            r"monte sur",
            r"s'adapte",
            r"convient",
        ],
    },
    IntentRule {
        intent: UserIntent::Troubleshoot,
        family: "support",
        page: "diagnostic_guide",
        patterns: &[
            r"bruit",
            r"grince",
            r"vibr",
            r"fui(t|te)",
            r"panne",
            r"probl[eè]me",
            r"voyant",
            r"claqu",
            r"sifflement",
            r"ne (fonctionne|marche|d[eé]marre)",
        ],
    },
    IntentRule {
        intent: UserIntent::Policy,
        family: "service",
        page: "policy_page",
        patterns: &[
            r"retour",
            r"rembours",
            r"garantie",
            r"livraison",
            r"d[eé]lai",
            r"exp[eé]di",
            r"annul",
        ],
    },
    IntentRule {
        intent: UserIntent::Cost,
        family: "transactional",
        page: "pricing",
        patterns: &[r"prix", r"co[uû]te?", r"combien", r"tarif", r"cher", r"promo"],
    },
    IntentRule {
        intent: UserIntent::Compare,
        family: "informational",
        page: "comparison",
        patterns: &[
            r"diff[eé]rence",
            r" ou bien ",
            r" vs ",
            r"versus",
            r"compar",
            r"mieux que",
        ],
    },
    IntentRule {
        intent: UserIntent::Maintain,
        family: "guidance",
        page: "maintenance_guide",
        patterns: &[
            r"entret(ien|enir)",
            r"dur[eé]e de vie",
            r"quand (changer|remplacer)",
            r"intervalle",
            r"r[eé]vision",
            r"tous les combien",
        ],
    },
    IntentRule {
        intent: UserIntent::Do,
        family: "guidance",
        page: "howto_guide",
        patterns: &[
            r"comment ",
            r"monter",
            r"installer",
            r"d[eé]monter",
            r"remplacer",
            r"changer",
            r"tuto",
            r"[eé]tapes",
        ],
    },
    IntentRule {
        intent: UserIntent::Define,
        family: "informational",
        page: "glossary",
        patterns: &[
            r"c'est quoi",
            r"qu'est[- ]ce",
            r"d[eé]finition",
            r"[aà] quoi sert",
            r"que signifie",
        ],
    },
];

const MATCHED_CONFIDENCE: f64 = 0.8;
const FALLBACK_CONFIDENCE: f64 = 0.4;

pub struct IntentClassifier {
    compiled: Vec<(usize, RegexSet)>,
}

impl IntentClassifier {
    pub fn new() -> Result<Self> {
        let mut compiled = Vec::with_capacity(RULES.len());
        for (idx, rule) in RULES.iter().enumerate() {
            let set = RegexSet::new(rule.patterns)
                .with_context(|| format!("invalid pattern set for intent {:?}", rule.intent))?;
            compiled.push((idx, set));
        }
        Ok(Self { compiled })
    }

    /// Classifies one message. Pure function of the input string.
    pub fn classify(&self, message: &str) -> IntentClassification {
        let normalized = message.trim().to_lowercase();
        for (idx, set) in &self.compiled {
            if set.is_match(&normalized) {
                let rule = &RULES[*idx];
                return IntentClassification {
                    user_intent: rule.intent,
                    intent_family: rule.family,
                    page_intent: rule.page,
                    confidence: MATCHED_CONFIDENCE,
                };
            }
        }
        IntentClassification {
            user_intent: UserIntent::Choose,
            intent_family: "transactional",
            page_intent: "product_listing",
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

/// Derives retrieval constraints for a classified intent.
///
/// Default truth levels are {L1, L2}; troubleshooting widens to L3 (field
/// diagnostics live there); policy and cost questions are instead scoped to
/// the categories that can answer them.
pub fn build_filters(intent: UserIntent) -> RetrievalFilters {
    match intent {
        UserIntent::Troubleshoot => RetrievalFilters {
            truth_levels: vec![TruthLevel::L1, TruthLevel::L2, TruthLevel::L3],
            categories: None,
        },
        UserIntent::Policy => RetrievalFilters {
            truth_levels: vec![TruthLevel::L1, TruthLevel::L2],
            categories: Some(vec![Category::Policy]),
        },
        UserIntent::Cost => RetrievalFilters {
            truth_levels: vec![TruthLevel::L1, TruthLevel::L2],
            categories: Some(vec![Category::Policy, Category::Catalog]),
        },
        _ => RetrievalFilters {
            truth_levels: vec![TruthLevel::L1, TruthLevel::L2],
            categories: None,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentStatEntry {
    pub intent: UserIntent,
    pub count: u64,
    pub confidence_sum: f64,
    pub last_seen: i64,
}

/// Rolling per-intent aggregate for observability. Owned by the server
/// state and injected into handlers; dies with the process.
#[derive(Default)]
pub struct IntentStats {
    inner: Mutex<HashMap<UserIntent, (u64, f64, i64)>>,
}

impl IntentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, classification: &IntentClassification) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .entry(classification.user_intent)
            .or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += classification.confidence;
        entry.2 = now_epoch();
    }

    pub fn snapshot(&self) -> Vec<IntentStatEntry> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<IntentStatEntry> = inner
            .iter()
            .map(|(intent, (count, confidence_sum, last_seen))| IntentStatEntry {
                intent: *intent,
                count: *count,
                confidence_sum: *confidence_sum,
                last_seen: *last_seen,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new().unwrap()
    }

    #[test]
    fn classifies_each_family() {
        let c = classifier();
        let cases = [
            ("Ce disque est-il compatible avec ma Clio 4 ?", UserIntent::Fitment),
            ("bruit de grincement au freinage", UserIntent::Troubleshoot),
            ("quel est le délai de livraison ?", UserIntent::Policy),
            ("combien coûte un jeu de plaquettes ?", UserIntent::Cost),
            ("différence entre disque plein et ventilé", UserIntent::Compare),
            ("quand changer les plaquettes ?", UserIntent::Maintain),
            ("comment monter un filtre à huile", UserIntent::Do),
            ("c'est quoi un disque ventilé ?", UserIntent::Define),
            ("plaquettes de frein", UserIntent::Choose),
        ];
        for (message, expected) in cases {
            assert_eq!(c.classify(message).user_intent, expected, "message: {}", message);
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let c = classifier();
        // Fitment and cost keywords together: fitment sits higher in the table.
        let r = c.classify("prix d'un disque compatible pour ma 208");
        assert_eq!(r.user_intent, UserIntent::Fitment);
    }

    #[test]
    fn classification_is_pure() {
        let c = classifier();
        let a = c.classify("  Bruit au freinage  ");
        let b = c.classify("  Bruit au freinage  ");
        assert_eq!(a.user_intent, b.user_intent);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn catch_all_has_lower_confidence() {
        let c = classifier();
        assert_eq!(c.classify("plaquettes").confidence, FALLBACK_CONFIDENCE);
        assert_eq!(c.classify("comment monter").confidence, MATCHED_CONFIDENCE);
    }

    #[test]
    fn troubleshoot_widens_truth_levels() {
        let filters = build_filters(UserIntent::Troubleshoot);
        assert_eq!(
            filters.truth_levels,
            vec![TruthLevel::L1, TruthLevel::L2, TruthLevel::L3]
        );
        assert!(filters.categories.is_none());
    }

    #[test]
    fn policy_and_cost_restrict_categories() {
        let policy = build_filters(UserIntent::Policy);
        assert_eq!(policy.truth_levels, vec![TruthLevel::L1, TruthLevel::L2]);
        assert_eq!(policy.categories, Some(vec![Category::Policy]));

        let cost = build_filters(UserIntent::Cost);
        assert_eq!(
            cost.categories,
            Some(vec![Category::Policy, Category::Catalog])
        );
    }

    #[test]
    fn stats_aggregate_counts_and_confidence() {
        let c = classifier();
        let stats = IntentStats::new();
        stats.record(&c.classify("bruit au freinage"));
        stats.record(&c.classify("grincement du disque"));
        stats.record(&c.classify("plaquettes"));

        let snapshot = stats.snapshot();
        let troubleshoot = snapshot
            .iter()
            .find(|e| e.intent == UserIntent::Troubleshoot)
            .unwrap();
        assert_eq!(troubleshoot.count, 2);
        assert!((troubleshoot.confidence_sum - 1.6).abs() < 1e-9);
        assert!(troubleshoot.last_seen > 0);
    }
}

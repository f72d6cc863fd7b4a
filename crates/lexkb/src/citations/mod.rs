//! Citation collection: turns recognizer output into the two ordered,
//! de-duplicated lists stored as `cited_cases` and `cited_statutes`.

pub mod patterns;

use std::collections::HashSet;

use log::{debug, warn};

use crate::error::ServiceError;

pub use patterns::RegexCitationRecognizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationKind {
    Case,
    Statute,
    /// Short forms, `id.`, `supra` and the like. Not collected.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub kind: CitationKind,
    pub display: String,
}

impl Citation {
    pub fn case(display: impl Into<String>) -> Self {
        Self {
            kind: CitationKind::Case,
            display: display.into(),
        }
    }

    pub fn statute(display: impl Into<String>) -> Self {
        Self {
            kind: CitationKind::Statute,
            display: display.into(),
        }
    }
}

/// Finds citations in document text.
///
/// The outer `Err` is a total failure of the recognizer; an inner `Err` is
/// one citation that could not be rendered.
pub trait CitationRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<Result<Citation, ServiceError>>, ServiceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationLists {
    pub cases: Vec<String>,
    pub statutes: Vec<String>,
}

impl CitationLists {
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty() && self.statutes.is_empty()
    }

    /// Cases first, then statutes.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.cases.iter().chain(self.statutes.iter())
    }
}

/// What the collector produced, plus how much it had to drop.
#[derive(Debug, Clone, Default)]
pub struct CitationReport {
    pub citations: CitationLists,
    pub skipped: usize,
    /// Set when the recognizer failed outright and both lists are empty.
    pub failure: Option<String>,
}

/// Runs `recognizer` over `text` and splits the result into case and
/// statute lists, each in first-seen order with exact duplicates removed.
///
/// Never fails: a broken citation is skipped, a broken recognizer yields
/// empty lists.
pub fn collect_citations(recognizer: &dyn CitationRecognizer, text: &str) -> CitationReport {
    let found = match recognizer.recognize(text) {
        Ok(found) => found,
        Err(e) => {
            warn!("Citation recognizer failed: {}", e);
            return CitationReport {
                failure: Some(e.to_string()),
                ..CitationReport::default()
            };
        }
    };

    let mut report = CitationReport::default();
    let mut seen_cases = HashSet::new();
    let mut seen_statutes = HashSet::new();

    for item in found {
        let citation = match item {
            Ok(citation) => citation,
            Err(e) => {
                debug!("Skipping citation: {}", e);
                report.skipped += 1;
                continue;
            }
        };

        let display = citation.display.trim();
        if display.is_empty() {
            report.skipped += 1;
            continue;
        }

        let (list, seen) = match citation.kind {
            CitationKind::Case => (&mut report.citations.cases, &mut seen_cases),
            CitationKind::Statute => (&mut report.citations.statutes, &mut seen_statutes),
            CitationKind::Other => continue,
        };
        if seen.insert(display.to_string()) {
            list.push(display.to_string());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<Result<Citation, ServiceError>>);

    impl CitationRecognizer for Scripted {
        fn recognize(
            &self,
            _text: &str,
        ) -> Result<Vec<Result<Citation, ServiceError>>, ServiceError> {
            Ok(self
                .0
                .iter()
                .map(|r| match r {
                    Ok(c) => Ok(c.clone()),
                    Err(e) => Err(ServiceError::Citation(e.to_string())),
                })
                .collect())
        }
    }

    struct Broken;

    impl CitationRecognizer for Broken {
        fn recognize(
            &self,
            _text: &str,
        ) -> Result<Vec<Result<Citation, ServiceError>>, ServiceError> {
            Err(ServiceError::Citation("tokenizer crashed".to_string()))
        }
    }

    #[test]
    fn test_dedupes_in_first_seen_order() {
        let recognizer = Scripted(vec![
            Ok(Citation::case("410 U.S. 113")),
            Ok(Citation::statute("42 U.S.C. § 1983")),
            Ok(Citation::case("123 F.3d 456")),
            Ok(Citation::case("410 U.S. 113")),
            Ok(Citation::statute("42 U.S.C. § 1983")),
            Ok(Citation::case("[2019] eKLR")),
        ]);

        let report = collect_citations(&recognizer, "text");
        assert_eq!(
            report.citations.cases,
            vec!["410 U.S. 113", "123 F.3d 456", "[2019] eKLR"]
        );
        assert_eq!(report.citations.statutes, vec!["42 U.S.C. § 1983"]);
        assert!(report.failure.is_none());
    }

    #[test]
    fn test_same_string_may_appear_in_each_list_once() {
        let recognizer = Scripted(vec![
            Ok(Citation::case("Cap. 21")),
            Ok(Citation::statute("Cap. 21")),
        ]);
        let report = collect_citations(&recognizer, "text");
        assert_eq!(report.citations.cases, vec!["Cap. 21"]);
        assert_eq!(report.citations.statutes, vec!["Cap. 21"]);
        assert_eq!(report.citations.all().count(), 2);
    }

    #[test]
    fn test_bad_items_are_skipped() {
        let recognizer = Scripted(vec![
            Err(ServiceError::Citation("unrenderable".to_string())),
            Ok(Citation::case("   ")),
            Ok(Citation {
                kind: CitationKind::Other,
                display: "Id. at 5".to_string(),
            }),
            Ok(Citation::case(" 410 U.S. 113 ")),
        ]);
        let report = collect_citations(&recognizer, "text");
        assert_eq!(report.citations.cases, vec!["410 U.S. 113"]);
        assert!(report.citations.statutes.is_empty());
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn test_total_failure_degrades_to_empty() {
        let report = collect_citations(&Broken, "text");
        assert!(report.citations.is_empty());
        assert!(report.failure.unwrap().contains("tokenizer crashed"));
    }
}

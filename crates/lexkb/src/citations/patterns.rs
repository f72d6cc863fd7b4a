use std::sync::LazyLock;

use regex::Regex;

use super::{Citation, CitationKind, CitationRecognizer};
use crate::error::ServiceError;

// Reporter citations: volume, reporter abbreviation, first page.
static RE_REPORTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d{1,4}\s+(?:U\.\s?S\.|S\.\s?Ct\.|L\.\s?Ed\.(?:\s?2d)?|F\.\s?Supp\.(?:\s?(?:2d|3d))?|F\.(?:\s?(?:2d|3d|4th))?|A\.(?:\s?(?:2d|3d))?|P\.(?:\s?(?:2d|3d))?|N\.E\.(?:\s?(?:2d|3d))?|N\.W\.(?:\s?2d)?|S\.E\.(?:\s?2d)?|S\.W\.(?:\s?(?:2d|3d))?|So\.(?:\s?(?:2d|3d))?|All\s?ER|WLR|EA|KLR)\s+\d{1,5}\b",
    )
    .unwrap()
});

// Neutral citations: `[2019] eKLR`, `[2020] UKSC 12`, `[2015] EWCA Civ 3`.
static RE_NEUTRAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[\d{4}\]\s+(?:eKLR|UKSC|UKHL|UKPC|EWCA\s+(?:Civ|Crim)|EWHC|KESC|KECA|KEHC|ZACC|ZASCA|NZSC|HCA|SCC)(?:\s+\d{1,5})?",
    )
    .unwrap()
});

static RE_USC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}\s+U\.\s?S\.\s?C\.(?:\s?A\.)?\s*§{1,2}\s*\d+[a-z]?(?:\([A-Za-z0-9]+\))*")
        .unwrap()
});

static RE_CFR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}\s+C\.\s?F\.\s?R\.\s*§{1,2}\s*\d+(?:\.\d+)*").unwrap()
});

// Kenyan and Commonwealth statute references: `Cap. 21`, `Act No. 3 of 2010`.
static RE_CHAPTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCap\.\s?\d+[A-Z]?\b").unwrap());

static RE_ACT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bAct\s+No\.\s*\d+\s+of\s+\d{4}\b").unwrap());

/// Pattern-based recognizer for common reporter, neutral and statute
/// citation forms.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexCitationRecognizer;

impl RegexCitationRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl CitationRecognizer for RegexCitationRecognizer {
    fn recognize(&self, text: &str) -> Result<Vec<Result<Citation, ServiceError>>, ServiceError> {
        let patterns: [(&Regex, CitationKind); 6] = [
            (&RE_REPORTER, CitationKind::Case),
            (&RE_NEUTRAL, CitationKind::Case),
            (&RE_USC, CitationKind::Statute),
            (&RE_CFR, CitationKind::Statute),
            (&RE_CHAPTER, CitationKind::Statute),
            (&RE_ACT_NUMBER, CitationKind::Statute),
        ];

        let mut spans: Vec<(usize, usize, CitationKind)> = Vec::new();
        for (regex, kind) in patterns {
            for m in regex.find_iter(text) {
                spans.push((m.start(), m.end(), kind));
            }
        }
        // Document order; on equal starts the longer match wins.
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut found = Vec::new();
        let mut covered_until = 0;
        for (start, end, kind) in spans {
            if start < covered_until {
                continue;
            }
            covered_until = end;
            found.push(Ok(Citation {
                kind,
                display: normalize(&text[start..end]),
            }));
        }
        Ok(found)
    }
}

fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

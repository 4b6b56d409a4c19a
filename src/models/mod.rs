//! Core data models for the achievement standard recommender.
//!
//! This module contains the fundamental data structures used across the
//! application: school levels, grade bands, standard records, query-time
//! documents, and recommendation results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing model values from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown school level token
    #[error("Unknown school level: '{0}' (expected elementary, middle, or high)")]
    UnknownLevel(String),

    /// Grade band outside the fixed enumeration
    #[error("Unknown grade band: '{0}' (expected 1~2학년, 3~4학년, or 5~6학년)")]
    UnknownGradeBand(String),

    /// Flat record line that does not have the expected comma-delimited shape
    #[error("Malformed flat record line: '{0}'")]
    MalformedFlatLine(String),
}

/// School level served by a corpus.
///
/// Elementary corpora are keyed by grade band then subject; middle and high
/// school corpora have no grade axis and are keyed by subject only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolLevel {
    Elementary,
    Middle,
    High,
}

impl SchoolLevel {
    /// Whether corpora for this level carry a grade-band axis.
    pub fn has_grade_axis(&self) -> bool {
        matches!(self, SchoolLevel::Elementary)
    }

    /// The enumerated subject list offered for this level.
    ///
    /// These mirror the subject selectors of the interactive tool; the
    /// corpus itself treats subjects as free-form keys.
    pub fn subjects(&self) -> &'static [&'static str] {
        match self {
            SchoolLevel::Elementary => &[
                "국어", "수학", "사회", "과학", "도덕", "체육", "음악", "미술", "실과",
            ],
            SchoolLevel::Middle => &["과학", "미술", "수학"],
            SchoolLevel::High => &["미술"],
        }
    }
}

impl FromStr for SchoolLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elementary" => Ok(SchoolLevel::Elementary),
            "middle" => Ok(SchoolLevel::Middle),
            "high" => Ok(SchoolLevel::High),
            other => Err(ParseError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for SchoolLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchoolLevel::Elementary => "elementary",
            SchoolLevel::Middle => "middle",
            SchoolLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Elementary-school two-year grade band.
///
/// These are the only valid top-level keys of an elementary corpus; the
/// serialized form is the exact Korean label used in the source documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GradeBand {
    #[serde(rename = "1~2학년")]
    Grade1To2,
    #[serde(rename = "3~4학년")]
    Grade3To4,
    #[serde(rename = "5~6학년")]
    Grade5To6,
}

impl GradeBand {
    /// All grade bands, in school order.
    pub const ALL: [GradeBand; 3] = [
        GradeBand::Grade1To2,
        GradeBand::Grade3To4,
        GradeBand::Grade5To6,
    ];

    /// The Korean label used in source text and corpus keys.
    pub fn label(&self) -> &'static str {
        match self {
            GradeBand::Grade1To2 => "1~2학년",
            GradeBand::Grade3To4 => "3~4학년",
            GradeBand::Grade5To6 => "5~6학년",
        }
    }
}

impl FromStr for GradeBand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1~2학년" => Ok(GradeBand::Grade1To2),
            "3~4학년" => Ok(GradeBand::Grade3To4),
            "5~6학년" => Ok(GradeBand::Grade5To6),
            other => Err(ParseError::UnknownGradeBand(other.to_string())),
        }
    }
}

impl fmt::Display for GradeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One flat achievement-standard record emitted by the normalizer.
///
/// `grade` is present only for elementary sources. `content` is the full
/// standard line including its bracketed code, e.g.
/// `[2수01-01] 수를 센다.`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// Grade band, if the source has a grade axis
    pub grade: Option<GradeBand>,

    /// Subject token (first word of the header's subject phrase)
    pub subject: String,

    /// Full standard statement including its bracketed code
    pub content: String,
}

impl StandardRecord {
    /// Create a new record.
    pub fn new(grade: Option<GradeBand>, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            grade,
            subject: subject.into(),
            content: content.into(),
        }
    }

    /// Render this record as one line of the intermediate flat text format.
    ///
    /// Elementary records render as `<grade>,<subject>,<content>`; middle and
    /// high school records render as `<subject>, <content>`. Only the leading
    /// commas are significant; the content may itself contain commas.
    pub fn to_flat_line(&self) -> String {
        match self.grade {
            Some(grade) => format!("{},{},{}", grade, self.subject, self.content),
            None => format!("{}, {}", self.subject, self.content),
        }
    }

    /// Parse one line of the intermediate flat text format.
    ///
    /// The expected shape depends on the school level: three comma-separated
    /// fields for elementary, two for middle/high. Fields are trimmed.
    ///
    /// # Errors
    /// Returns `ParseError::MalformedFlatLine` if the line does not have the
    /// expected number of fields, or `ParseError::UnknownGradeBand` if an
    /// elementary line carries an unrecognized grade label.
    pub fn parse_flat_line(line: &str, level: SchoolLevel) -> Result<Self, ParseError> {
        if level.has_grade_axis() {
            let mut parts = line.splitn(3, ',');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(grade), Some(subject), Some(content)) => Ok(Self::new(
                    Some(grade.parse()?),
                    subject.trim(),
                    content.trim(),
                )),
                _ => Err(ParseError::MalformedFlatLine(line.to_string())),
            }
        } else {
            let mut parts = line.splitn(2, ',');
            match (parts.next(), parts.next()) {
                (Some(subject), Some(content)) => {
                    Ok(Self::new(None, subject.trim(), content.trim()))
                }
                _ => Err(ParseError::MalformedFlatLine(line.to_string())),
            }
        }
    }
}

/// A transient query-time document produced by the corpus filter.
///
/// Each filtered standard carries its subject (and grade, when applicable)
/// as metadata so the ranker can re-check the selection defensively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardDocument {
    /// Full standard statement
    pub content: String,

    /// Subject this standard belongs to
    pub subject: String,

    /// Grade band, if the corpus has a grade axis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeBand>,
}

/// Relevance classification for recommendations.
///
/// Standards are categorized by their semantic similarity to the activity
/// text, allowing users to understand the quality of matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Lower similarity but still relevant (cosine similarity > 0.50)
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }
}

/// A single recommendation returned by the ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Full standard statement
    pub content: String,

    /// Cosine similarity score against the activity text (higher is better)
    pub score: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl Recommendation {
    /// Create a new recommendation from a standard and its similarity score.
    pub fn new(content: String, score: f32) -> Self {
        Self {
            content,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

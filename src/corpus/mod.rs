//! Corpus construction, persistence, and filtering.
//!
//! The corpus is a nested lookup of achievement standards, built offline and
//! read-only at query time. Elementary corpora are keyed by grade band then
//! subject; middle/high corpora are keyed by subject only. Leaf lists keep the
//! standards in first-seen source order, and duplicate statements under the
//! same key are preserved (deduplication happens only at query time).
//!
//! Construction goes through [`CorpusBuilder`], a single mutable owner of the
//! nested structure that yields an immutable [`CorpusIndex`] on completion.
//! The on-disk format is UTF-8 JSON:
//!
//! ```json
//! { "1~2학년": { "수학": ["[2수01-01] ...", "..."] } }
//! ```
//!
//! for elementary, and `{ "수학": ["..."] }` for middle/high school.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{GradeBand, SchoolLevel, StandardDocument, StandardRecord};

/// Errors that can occur while loading or saving a corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corpus JSON could not be parsed or serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for corpus operations.
pub type CorpusResult<T> = Result<T, CorpusError>;

type SubjectMap = IndexMap<String, Vec<String>>;
type GradeMap = IndexMap<GradeBand, SubjectMap>;

/// An immutable nested lookup of achievement standards.
///
/// The two variants mirror the two on-disk shapes; deserialization picks the
/// variant by whether the top-level keys parse as grade-band labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorpusIndex {
    /// Elementary: grade band → subject → standards
    Elementary(GradeMap),

    /// Middle/high school: subject → standards
    Secondary(SubjectMap),
}

impl CorpusIndex {
    /// Load a corpus from a UTF-8 JSON file.
    ///
    /// The corpus is intentionally re-read on every request rather than
    /// cached; files are small and the tool treats the on-disk corpus as the
    /// source of truth.
    pub fn load(path: impl AsRef<Path>) -> CorpusResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let corpus = serde_json::from_str(&text)?;
        Ok(corpus)
    }

    /// Write the corpus as pretty-printed UTF-8 JSON.
    ///
    /// Korean text is written as-is, not ASCII-escaped. Key order is the
    /// builder's insertion order, so output is deterministic for a given
    /// record sequence.
    pub fn save(&self, path: impl AsRef<Path>) -> CorpusResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Total number of standards across all leaves.
    pub fn len(&self) -> usize {
        match self {
            CorpusIndex::Elementary(grades) => grades
                .values()
                .flat_map(|subjects| subjects.values())
                .map(|standards| standards.len())
                .sum(),
            CorpusIndex::Secondary(subjects) => {
                subjects.values().map(|standards| standards.len()).sum()
            }
        }
    }

    /// Whether the corpus holds no standards at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize the standards for one grade/subject selection.
    ///
    /// If `grade` is supplied, both the grade and the subject beneath it must
    /// exist; if `grade` is omitted, the subject must exist at the top level.
    /// Any absent combination, including a grade supplied against a
    /// middle/high corpus or omitted against an elementary one, yields an
    /// empty list. This operation never fails.
    ///
    /// Documents come out in stored (first-seen) order, each tagged with the
    /// selection as metadata.
    pub fn filter(&self, grade: Option<GradeBand>, subject: &str) -> Vec<StandardDocument> {
        let standards = match (self, grade) {
            (CorpusIndex::Elementary(grades), Some(grade)) => grades
                .get(&grade)
                .and_then(|subjects| subjects.get(subject)),
            (CorpusIndex::Secondary(subjects), None) => subjects.get(subject),
            // Grade axis mismatch between the selection and the corpus shape
            _ => None,
        };

        let docs: Vec<StandardDocument> = standards
            .map(|standards| {
                standards
                    .iter()
                    .map(|content| StandardDocument {
                        content: content.clone(),
                        subject: subject.to_string(),
                        grade,
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            grade = ?grade,
            subject = %subject,
            count = docs.len(),
            "filtered corpus"
        );
        docs
    }
}

/// Mutable builder that owns the nested structure during construction.
///
/// Append-only: `push` creates grade/subject keys on first sight and appends
/// the content to the leaf list. No sorting, no deduplication, no validation
/// of the standard-code format. `finish` yields the immutable index.
#[derive(Debug)]
pub struct CorpusBuilder {
    level: SchoolLevel,
    grades: GradeMap,
    subjects: SubjectMap,
    skipped: usize,
}

impl CorpusBuilder {
    /// Create a builder for the given school level.
    pub fn new(level: SchoolLevel) -> Self {
        Self {
            level,
            grades: GradeMap::new(),
            subjects: SubjectMap::new(),
            skipped: 0,
        }
    }

    /// Append one record under its grade/subject key.
    ///
    /// A record whose grade axis does not match the builder's level (a
    /// gradeless record in an elementary build, or vice versa) is skipped
    /// with a warning; the normalizer never produces such records, so this
    /// only triggers on hand-assembled input.
    pub fn push(&mut self, record: StandardRecord) {
        match (self.level.has_grade_axis(), record.grade) {
            (true, Some(grade)) => {
                self.grades
                    .entry(grade)
                    .or_default()
                    .entry(record.subject)
                    .or_default()
                    .push(record.content);
            }
            (false, None) => {
                self.subjects
                    .entry(record.subject)
                    .or_default()
                    .push(record.content);
            }
            _ => {
                warn!(
                    level = %self.level,
                    grade = ?record.grade,
                    "record grade axis does not match build level; skipped"
                );
                self.skipped += 1;
            }
        }
    }

    /// Append every record of an ordered sequence.
    pub fn extend<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = StandardRecord>,
    {
        for record in records {
            self.push(record);
        }
    }

    /// Number of records skipped for a grade-axis mismatch.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Consume the builder and yield the immutable corpus index.
    pub fn finish(self) -> CorpusIndex {
        if self.level.has_grade_axis() {
            CorpusIndex::Elementary(self.grades)
        } else {
            CorpusIndex::Secondary(self.subjects)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GradeBand;

    fn elem_record(grade: GradeBand, subject: &str, content: &str) -> StandardRecord {
        StandardRecord::new(Some(grade), subject, content)
    }

    fn sample_elementary() -> CorpusIndex {
        let mut builder = CorpusBuilder::new(SchoolLevel::Elementary);
        builder.extend([
            elem_record(GradeBand::Grade1To2, "수학", "[2수01-01] 수를 센다."),
            elem_record(GradeBand::Grade1To2, "수학", "[2수01-02] 수를 비교한다."),
            elem_record(GradeBand::Grade3To4, "과학", "[4과01-01] 관찰한다."),
        ]);
        builder.finish()
    }

    #[test]
    fn test_builder_groups_by_grade_then_subject() {
        let corpus = sample_elementary();
        assert_eq!(corpus.len(), 3);

        let docs = corpus.filter(Some(GradeBand::Grade1To2), "수학");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "[2수01-01] 수를 센다.");
        assert_eq!(docs[1].content, "[2수01-02] 수를 비교한다.");
        assert_eq!(docs[0].grade, Some(GradeBand::Grade1To2));
        assert_eq!(docs[0].subject, "수학");
    }

    #[test]
    fn test_builder_preserves_duplicates_and_order() {
        let mut builder = CorpusBuilder::new(SchoolLevel::Middle);
        builder.extend([
            StandardRecord::new(None, "과학", "[9과01-02] 측정한다."),
            StandardRecord::new(None, "과학", "[9과01-01] 관찰한다."),
            StandardRecord::new(None, "과학", "[9과01-02] 측정한다."),
        ]);
        let corpus = builder.finish();

        let docs = corpus.filter(None, "과학");
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        // Append-only: source order kept, duplicate kept
        assert_eq!(
            contents,
            vec![
                "[9과01-02] 측정한다.",
                "[9과01-01] 관찰한다.",
                "[9과01-02] 측정한다.",
            ]
        );
    }

    #[test]
    fn test_builder_is_deterministic() {
        let records = [
            elem_record(GradeBand::Grade5To6, "사회", "[6사01-01] 지도를 읽는다."),
            elem_record(GradeBand::Grade1To2, "국어", "[2국01-01] 글자를 읽는다."),
            elem_record(GradeBand::Grade5To6, "국어", "[6국01-01] 토의한다."),
        ];

        let build = || {
            let mut builder = CorpusBuilder::new(SchoolLevel::Elementary);
            builder.extend(records.clone());
            serde_json::to_string_pretty(&builder.finish()).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_builder_skips_grade_axis_mismatch() {
        let mut builder = CorpusBuilder::new(SchoolLevel::Elementary);
        builder.push(StandardRecord::new(None, "수학", "[2수01-01] 수를 센다."));
        assert_eq!(builder.skipped(), 1);
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn test_filter_totality() {
        let corpus = sample_elementary();

        // Grade absent from the corpus
        assert!(corpus.filter(Some(GradeBand::Grade5To6), "수학").is_empty());
        // Subject absent under a present grade
        assert!(corpus.filter(Some(GradeBand::Grade1To2), "미술").is_empty());
        // Grade omitted against an elementary corpus
        assert!(corpus.filter(None, "수학").is_empty());

        // Grade supplied against a secondary corpus
        let mut builder = CorpusBuilder::new(SchoolLevel::Middle);
        builder.push(StandardRecord::new(None, "과학", "[9과01-01] 관찰한다."));
        let secondary = builder.finish();
        assert!(secondary
            .filter(Some(GradeBand::Grade1To2), "과학")
            .is_empty());
        assert!(secondary.filter(None, "영어").is_empty());
    }

    #[test]
    fn test_elementary_json_shape() {
        let corpus = sample_elementary();
        let json = serde_json::to_value(&corpus).unwrap();
        assert_eq!(
            json["1~2학년"]["수학"][0],
            serde_json::json!("[2수01-01] 수를 센다.")
        );
        assert_eq!(
            json["3~4학년"]["과학"][0],
            serde_json::json!("[4과01-01] 관찰한다.")
        );
    }

    #[test]
    fn test_round_trip_through_file() {
        let corpus = sample_elementary();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standards.json");

        corpus.save(&path).unwrap();
        let loaded = CorpusIndex::load(&path).unwrap();
        assert_eq!(loaded, corpus);
    }

    #[test]
    fn test_secondary_deserializes_as_secondary() {
        // Top-level keys that are not grade-band labels select the
        // subject-keyed variant
        let json = r#"{ "과학": ["[9과01-01] 관찰한다."] }"#;
        let corpus: CorpusIndex = serde_json::from_str(json).unwrap();
        assert!(matches!(corpus, CorpusIndex::Secondary(_)));
        assert_eq!(corpus.filter(None, "과학").len(), 1);
    }

    #[test]
    fn test_elementary_deserializes_as_elementary() {
        let json = r#"{ "1~2학년": { "수학": ["[2수01-01] 수를 센다."] } }"#;
        let corpus: CorpusIndex = serde_json::from_str(json).unwrap();
        assert!(matches!(corpus, CorpusIndex::Elementary(_)));
        assert_eq!(corpus.filter(Some(GradeBand::Grade1To2), "수학").len(), 1);
    }
}

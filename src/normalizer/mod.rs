//! Raw-text normalizer.
//!
//! This module scans raw pasted curriculum text and turns it into a flat,
//! ordered stream of [`StandardRecord`]s. Each input line is classified as a
//! header line (starts with the `▶` marker and names a grade/subject), a
//! standard line (starts with a bracketed standard code), or noise.
//!
//! The scanner carries one piece of context between lines: the grade and
//! subject of the most recently matched header. Standard lines are emitted
//! tagged with that context; a standard line seen before any header is
//! dropped with a warning rather than emitted with blank keys.
//!
//! # Usage
//!
//! ```rust,no_run
//! use standards_search::models::SchoolLevel;
//! use standards_search::normalizer::LineScanner;
//!
//! let raw = "▶ 3~4학년 과학 탐구 성취기준\n[4과01-01] 관찰한다.\n";
//! let mut scanner = LineScanner::new(SchoolLevel::Elementary);
//! let records = scanner.scan(raw.lines());
//! assert_eq!(records.len(), 1);
//! ```

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{GradeBand, SchoolLevel, StandardRecord};

/// Marker character that opens a grade/subject header line.
const HEADER_MARKER: char = '▶';

/// Classification of a single raw input line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// A matched header carrying new scanner context
    Header {
        grade: Option<GradeBand>,
        subject: String,
    },

    /// A header-marked line that did not match the expected shape
    MalformedHeader,

    /// A standard statement (starts with a bracketed code)
    Standard(String),

    /// Anything else (blank lines, prose, page furniture)
    Ignored,
}

/// Counters reported after a scan.
///
/// Malformed headers and orphan standards are the two silent-data-loss paths
/// of the source format, so they are tracked explicitly and logged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Total lines consumed
    pub lines: usize,

    /// Header lines that matched and updated the context
    pub headers_matched: usize,

    /// Header-marked lines that failed to match the expected shape
    pub headers_malformed: usize,

    /// Standard records emitted
    pub records_emitted: usize,

    /// Standard lines seen before any matched header, dropped
    pub orphans_dropped: usize,
}

/// Grade/subject context carried between lines.
///
/// Both fields start unset; a standard line is only emitted once a header
/// has established a subject (and, for elementary sources, a grade).
#[derive(Debug, Default, Clone)]
struct HeaderContext {
    grade: Option<GradeBand>,
    subject: Option<String>,
}

/// Line-classification scanner over raw curriculum text.
///
/// The scanner is configured per school level because the header shapes
/// differ: elementary headers name a grade band and a subject phrase
/// (`▶ 3~4학년 과학 탐구 성취기준`), while middle/high headers name only a
/// subject, optionally prefixed with the school name (`▶ 중학교 과학`).
pub struct LineScanner {
    level: SchoolLevel,
    header_re: Regex,
    standard_re: Regex,
    context: HeaderContext,
    stats: ScanStats,
}

impl LineScanner {
    /// Create a scanner for the given school level.
    pub fn new(level: SchoolLevel) -> Self {
        // Both patterns are fixed at compile time, so construction cannot fail.
        let header_re = if level.has_grade_axis() {
            Regex::new(r"▶\s*([0-9~학년]+)\s+(.+?)\s+성취기준").expect("valid header pattern")
        } else {
            Regex::new(r"▶\s*(?:중학교\s|고등학교\s)?([가-힣]+)").expect("valid header pattern")
        };
        let standard_re =
            Regex::new(r"^\[[0-9A-Za-z가-힣\- ]+\]").expect("valid standard pattern");

        Self {
            level,
            header_re,
            standard_re,
            context: HeaderContext::default(),
            stats: ScanStats::default(),
        }
    }

    /// Classify one trimmed line against the level's patterns.
    ///
    /// Classification alone does not touch the carried context; callers use
    /// [`LineScanner::push_line`] for stateful scanning.
    pub fn classify(&self, line: &str) -> LineKind {
        if line.starts_with(HEADER_MARKER) {
            return match self.parse_header(line) {
                Some((grade, subject)) => LineKind::Header { grade, subject },
                None => LineKind::MalformedHeader,
            };
        }
        if self.standard_re.is_match(line) {
            return LineKind::Standard(line.to_string());
        }
        LineKind::Ignored
    }

    fn parse_header(&self, line: &str) -> Option<(Option<GradeBand>, String)> {
        let caps = self.header_re.captures(line)?;
        if self.level.has_grade_axis() {
            let grade: GradeBand = caps.get(1)?.as_str().trim().parse().ok()?;
            // The subject phrase may carry a domain suffix ("국어 읽기");
            // only the first whitespace token is the subject.
            let phrase = caps.get(2)?.as_str().trim();
            let subject = phrase.split_whitespace().next()?.to_string();
            Some((Some(grade), subject))
        } else {
            let subject = caps.get(1)?.as_str().trim().to_string();
            Some((None, subject))
        }
    }

    /// Consume one raw line, updating context and possibly emitting a record.
    ///
    /// Returns `Some(record)` for standard lines seen under an established
    /// header context, `None` otherwise.
    pub fn push_line(&mut self, raw_line: &str) -> Option<StandardRecord> {
        let line = raw_line.trim();
        self.stats.lines += 1;

        match self.classify(line) {
            LineKind::Header { grade, subject } => {
                debug!(grade = ?grade, subject = %subject, "header matched");
                self.context.grade = grade;
                self.context.subject = Some(subject);
                self.stats.headers_matched += 1;
                None
            }
            LineKind::MalformedHeader => {
                warn!(line = %line, "header line did not match the expected shape; context unchanged");
                self.stats.headers_malformed += 1;
                None
            }
            LineKind::Standard(content) => match &self.context.subject {
                Some(subject) => {
                    self.stats.records_emitted += 1;
                    Some(StandardRecord::new(
                        self.context.grade,
                        subject.clone(),
                        content,
                    ))
                }
                None => {
                    warn!(line = %line, "standard line before any header; dropped");
                    self.stats.orphans_dropped += 1;
                    None
                }
            },
            LineKind::Ignored => None,
        }
    }

    /// Scan an ordered sequence of raw lines into an ordered record sequence.
    ///
    /// Output order equals input line order. Blank and unrecognized lines
    /// never affect the emitted records.
    pub fn scan<'a, I>(&mut self, lines: I) -> Vec<StandardRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.push_line(line))
            .collect()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELEM_SAMPLE: &str = "\
▶ 3~4학년 과학 탐구 성취기준
[4과01-01] 관찰한다.
이 줄은 무관한 설명입니다.
[4과01-02] 측정한다.
";

    fn scan_elementary(input: &str) -> (Vec<StandardRecord>, ScanStats) {
        let mut scanner = LineScanner::new(SchoolLevel::Elementary);
        let records = scanner.scan(input.lines());
        let stats = scanner.stats().clone();
        (records, stats)
    }

    #[test]
    fn test_header_context_applies_to_following_standards() {
        let (records, stats) = scan_elementary(ELEM_SAMPLE);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.grade, Some(GradeBand::Grade3To4));
            assert_eq!(record.subject, "과학");
        }
        assert_eq!(records[0].content, "[4과01-01] 관찰한다.");
        assert_eq!(records[1].content, "[4과01-02] 측정한다.");
        assert_eq!(stats.headers_matched, 1);
        assert_eq!(stats.records_emitted, 2);
    }

    #[test]
    fn test_unrelated_lines_do_not_change_output() {
        let (plain, _) = scan_elementary(ELEM_SAMPLE);
        let noisy = "\

메모: 아래는 성취기준 목록
▶ 3~4학년 과학 탐구 성취기준

[4과01-01] 관찰한다.
이 줄은 무관한 설명입니다.
쪽 번호 12
[4과01-02] 측정한다.

";
        let (with_noise, _) = scan_elementary(noisy);
        assert_eq!(plain, with_noise);
    }

    #[test]
    fn test_subject_is_first_token_of_phrase() {
        let input = "▶ 1~2학년 국어 읽기 성취기준\n[2국02-01] 글자를 읽는다.\n";
        let (records, _) = scan_elementary(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "국어");
        assert_eq!(records[0].grade, Some(GradeBand::Grade1To2));
    }

    #[test]
    fn test_new_header_replaces_context() {
        let input = "\
▶ 1~2학년 수학 성취기준
[2수01-01] 수를 센다.
▶ 5~6학년 사회 성취기준
[6사01-01] 지도를 읽는다.
";
        let (records, _) = scan_elementary(input);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].grade, Some(GradeBand::Grade1To2));
        assert_eq!(records[0].subject, "수학");
        assert_eq!(records[1].grade, Some(GradeBand::Grade5To6));
        assert_eq!(records[1].subject, "사회");
    }

    #[test]
    fn test_malformed_header_leaves_context_unchanged() {
        let input = "\
▶ 3~4학년 과학 탐구 성취기준
[4과01-01] 관찰한다.
▶ 잘못된 제목줄
[4과01-02] 측정한다.
";
        let (records, stats) = scan_elementary(input);
        assert_eq!(records.len(), 2);
        // Second record still carries the earlier header's context
        assert_eq!(records[1].grade, Some(GradeBand::Grade3To4));
        assert_eq!(records[1].subject, "과학");
        assert_eq!(stats.headers_malformed, 1);
    }

    #[test]
    fn test_standard_before_header_is_dropped() {
        let input = "[2수01-01] 수를 센다.\n▶ 1~2학년 수학 성취기준\n[2수01-02] 수를 비교한다.\n";
        let (records, stats) = scan_elementary(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "[2수01-02] 수를 비교한다.");
        assert_eq!(stats.orphans_dropped, 1);
    }

    #[test]
    fn test_middle_school_header_strips_school_prefix() {
        let input = "\
▶ 중학교 과학 성취기준
[9과01-01] 실험을 설계한다.
▶ 미술
[9미01-01] 표현 의도를 설명한다.
";
        let mut scanner = LineScanner::new(SchoolLevel::Middle);
        let records = scanner.scan(input.lines());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].grade, None);
        assert_eq!(records[0].subject, "과학");
        assert_eq!(records[1].subject, "미술");
    }

    #[test]
    fn test_high_school_header_prefix() {
        let input = "▶ 고등학교 미술\n[12미01-01] 작품을 비평한다.\n";
        let mut scanner = LineScanner::new(SchoolLevel::High);
        let records = scanner.scan(input.lines());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "미술");
    }

    #[test]
    fn test_classify_is_stateless() {
        let scanner = LineScanner::new(SchoolLevel::Elementary);
        assert_eq!(scanner.classify("쓸모없는 줄"), LineKind::Ignored);
        assert_eq!(scanner.classify(""), LineKind::Ignored);
        assert!(matches!(
            scanner.classify("[4과01-01] 관찰한다."),
            LineKind::Standard(_)
        ));
        assert!(matches!(
            scanner.classify("▶ 3~4학년 과학 성취기준"),
            LineKind::Header { .. }
        ));
        assert_eq!(scanner.classify("▶ 무의미"), LineKind::MalformedHeader);
    }
}

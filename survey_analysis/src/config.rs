// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use crate::aliases::AliasTable;

/// The side of the investment relationship a questionnaire was addressed to.
///
/// The tag is derived once, when a table is ingested, from the identity of its
/// source file. It is never recomputed afterwards.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum RespondentType {
    Company,
    Investor,
    Unknown,
}

impl RespondentType {
    /// Infers the respondent type from the name of a source (usually a file name).
    ///
    /// Investor questionnaires mention the investor side explicitly, so that marker
    /// is checked first.
    pub fn from_source_name(name: &str) -> RespondentType {
        let lower = name.to_lowercase();
        if name.contains("投資") || lower.contains("investor") {
            RespondentType::Investor
        } else if name.contains("公司") || lower.contains("company") {
            RespondentType::Company
        } else {
            RespondentType::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RespondentType::Company => "company",
            RespondentType::Investor => "investor",
            RespondentType::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != RespondentType::Unknown
    }
}

impl Display for RespondentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The development (investment) phase of the surveyed company.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Phase {
    Phase1,
    Phase2,
    Phase3,
    Unset,
}

impl Phase {
    /// Finds the first stage marker in a free-text label.
    ///
    /// Accepts the Han-numeral spellings used by the questionnaires
    /// (`第一階段`, `階段二`, ...) as well as `phase 1` / `stage 3`.
    pub fn from_label(label: &str) -> Phase {
        let lower = label.to_lowercase();
        let markers: [(Phase, &[&str]); 3] = [
            (
                Phase::Phase1,
                &["第一階段", "第一階", "階段一", "階段1", "phase1", "phase 1", "stage 1", "stage one"],
            ),
            (
                Phase::Phase2,
                &["第二階段", "第二階", "階段二", "階段2", "phase2", "phase 2", "stage 2", "stage two"],
            ),
            (
                Phase::Phase3,
                &["第三階段", "第三階", "階段三", "階段3", "phase3", "phase 3", "stage 3", "stage three"],
            ),
        ];
        // Earliest marker in the text wins, so "第一階段 (原第二階段)" is phase 1.
        let mut best: Option<(usize, Phase)> = None;
        for (phase, needles) in markers.iter() {
            for needle in needles.iter() {
                if let Some(pos) = lower.find(needle) {
                    if best.map(|(p, _)| pos < p).unwrap_or(true) {
                        best = Some((pos, *phase));
                    }
                }
            }
        }
        best.map(|(_, p)| p).unwrap_or(Phase::Unset)
    }

    /// Same as `from_label`, with a looser fallback on the bare ordinal
    /// (`第一`, `第二`, `第三`) which is how source files are usually named.
    pub fn from_source_name(name: &str) -> Phase {
        match Phase::from_label(name) {
            Phase::Unset => {
                if name.contains("第一") {
                    Phase::Phase1
                } else if name.contains("第二") {
                    Phase::Phase2
                } else if name.contains("第三") {
                    Phase::Phase3
                } else {
                    Phase::Unset
                }
            }
            p => p,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Phase1 => "phase 1",
            Phase::Phase2 => "phase 2",
            Phase::Phase3 => "phase 3",
            Phase::Unset => "unset",
        }
    }

    pub fn is_set(&self) -> bool {
        *self != Phase::Unset
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One respondent's answers.
///
/// Cells are keyed by the column (question identifier) of the table the record
/// belongs to. A cell that is absent, empty or only whitespace is missing.
#[derive(PartialEq, Debug, Clone)]
pub struct Record {
    respondent_type: RespondentType,
    phase: Phase,
    cells: HashMap<String, String>,
}

impl Record {
    pub fn new(respondent_type: RespondentType, phase: Phase) -> Record {
        Record {
            respondent_type,
            phase,
            cells: HashMap::new(),
        }
    }

    pub fn respondent_type(&self) -> RespondentType {
        self.respondent_type
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The answer for this column, if it is not missing.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn is_missing(&self, column: &str) -> bool {
        self.get(column).is_none()
    }

    pub(crate) fn set(&mut self, column: &str, value: &str) {
        self.cells.insert(column.to_string(), value.to_string());
    }
}

/// A survey table: ordered question columns and the records answering them.
#[derive(PartialEq, Debug, Clone)]
pub struct ResponseTable {
    name: String,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl ResponseTable {
    pub(crate) fn new(name: &str, columns: Vec<String>, records: Vec<Record>) -> ResponseTable {
        ResponseTable {
            name: name.to_string(),
            columns,
            records,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn non_missing_count(&self, column: &str) -> usize {
        self.records.iter().filter(|r| !r.is_missing(column)).count()
    }

    /// A column is present for analysis only if at least one record answered it.
    pub fn has_data(&self, column: &str) -> bool {
        self.has_column(column) && self.records.iter().any(|r| !r.is_missing(column))
    }

    /// Concatenates tables. The columns are the union of all the columns, in
    /// order of first appearance; record tags are preserved.
    pub fn concat(name: &str, tables: &[ResponseTable]) -> ResponseTable {
        let mut columns: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        for t in tables.iter() {
            for c in t.columns.iter() {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
            records.extend(t.records.iter().cloned());
        }
        ResponseTable::new(name, columns, records)
    }

    /// Copies the values of `source` into the cells where `target` is missing.
    /// Existing values of `target` are never overwritten. Returns the number of
    /// filled cells.
    pub(crate) fn fill_missing(&mut self, target: &str, source: &str) -> usize {
        let mut filled = 0;
        for r in self.records.iter_mut() {
            if r.is_missing(target) {
                if let Some(v) = r.get(source).map(|s| s.to_string()) {
                    r.set(target, &v);
                    filled += 1;
                }
            }
        }
        filled
    }
}

// ********* Configuration **********

/// Errors that prevent the analysis from starting.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisError {
    /// The survey does not contain any record.
    EmptySurvey,
    /// A numeric parameter of the configuration is outside of its valid range.
    InvalidParameter { name: &'static str, value: f64 },
}

impl Error for AnalysisError {}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::EmptySurvey => write!(f, "the survey does not contain any response"),
            AnalysisError::InvalidParameter { name, value } => {
                write!(f, "invalid value {} for parameter {}", value, name)
            }
        }
    }
}

/// Default patterns of administrative questions that must never be resolved
/// to a substantive column.
pub const DEFAULT_METADATA_PATTERNS: &[&str] = &[
    "公司名稱",
    "您代表的公司",
    "您的身分",
    "您的職稱",
    "填答者",
    "姓名",
    "電子郵件",
    "聯絡電話",
    "name of the company you represent",
    "company name",
    "your name",
    "e-mail",
    "email",
    "nt$",
    "$",
    "{{",
    "【分數】",
    "score:",
];

/// Parameters of the analysis.
///
/// Nothing in here refers to file paths: the ingestion collaborator builds the
/// tables and hands them over together with this value.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisConfig {
    /// Columns that are never analysed nor merged (administrative fields).
    pub excluded_columns: Vec<String>,
    /// Case-insensitive substrings flagging administrative questions.
    pub metadata_patterns: Vec<String>,
    /// Curated company-phrasing / investor-phrasing equivalences.
    pub aliases: AliasTable,
    /// Minimum adjusted similarity for two question texts to be merged.
    pub similarity_threshold: f64,
    /// Fraction of parseable values above which a column is numeric.
    pub numeric_threshold: f64,
    /// 2x2 tables with a total strictly below this use the Fisher exact test.
    pub fisher_total_threshold: u64,
    /// Chi-square abstains when an expected count is at or below this value.
    pub min_expected_count: f64,
    /// Expected counts below this value are reported as a caveat.
    pub low_expected_level: f64,
    /// Every compared group must have at least this many respondents.
    pub min_group_size: usize,
    /// Separator between the options of a multi-select answer.
    pub multi_select_delimiter: char,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            excluded_columns: Vec::new(),
            metadata_patterns: DEFAULT_METADATA_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            aliases: AliasTable::new(),
            similarity_threshold: 0.72,
            numeric_threshold: 0.7,
            fisher_total_threshold: 20,
            min_expected_count: 1.0,
            low_expected_level: 5.0,
            min_group_size: 3,
            multi_select_delimiter: '\n',
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let unit_params = [
            ("similarity_threshold", self.similarity_threshold),
            ("numeric_threshold", self.numeric_threshold),
        ];
        for (name, value) in unit_params.iter() {
            if !(0.0..=1.0).contains(value) {
                return Err(AnalysisError::InvalidParameter {
                    name: *name,
                    value: *value,
                });
            }
        }
        if self.min_expected_count.is_nan() || self.min_expected_count < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "min_expected_count",
                value: self.min_expected_count,
            });
        }
        if self.low_expected_level.is_nan() || self.low_expected_level < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "low_expected_level",
                value: self.low_expected_level,
            });
        }
        if self.min_group_size < 2 {
            return Err(AnalysisError::InvalidParameter {
                name: "min_group_size",
                value: self.min_group_size as f64,
            });
        }
        Ok(())
    }

    pub fn is_excluded(&self, column: &str) -> bool {
        self.excluded_columns.iter().any(|c| c == column)
    }

    /// True if the question text looks like an administrative field.
    pub fn is_metadata(&self, question: &str) -> bool {
        let lower = question.to_lowercase();
        self.metadata_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| lower.contains(&p.to_lowercase()))
    }
}

use std::error::Error;
use std::fmt::Display;

use log::{debug, warn};

pub use crate::config::*;
use crate::categories::normalize;
use crate::similarity::clean_column_name;

// Each line is one option of a multi-select answer and is normalized alone.
fn clean_answer(raw: &str) -> String {
    raw.lines()
        .map(normalize)
        .filter(|l| !l.is_empty())
        .collect::<Vec<String>>()
        .join("\n")
}

/// Problems found while assembling a table from raw rows.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum IngestError {
    /// Rows were added before the header.
    NoColumns,
    /// A row has more cells than the header has columns.
    RowTooLong {
        row: usize,
        cells: usize,
        columns: usize,
    },
}

impl Error for IngestError {}

impl Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::NoColumns => write!(f, "no header row was provided"),
            IngestError::RowTooLong {
                row,
                cells,
                columns,
            } => write!(
                f,
                "row {} has {} cells but the header only has {} columns",
                row, cells, columns
            ),
        }
    }
}

/// A builder for response tables.
///
/// The respondent type and phase are inferred from the source name when the
/// builder is created. They can be overridden before the first row is added.
///
/// ```
/// use survey_analysis::builder::TableBuilder;
/// use survey_analysis::{Phase, RespondentType};
/// # use survey_analysis::builder::IngestError;
///
/// let mut builder = TableBuilder::new("治理問卷第二階段投資方.csv");
/// builder.columns(&["【單選】董事會成員人數", "備註"]);
/// builder.add_row(&["5", ""])?;
/// let table = builder.build();
///
/// assert_eq!(table.columns(), &["董事會成員人數".to_string(), "備註".to_string()]);
/// assert_eq!(table.records()[0].respondent_type(), RespondentType::Investor);
/// assert_eq!(table.records()[0].phase(), Phase::Phase2);
/// # Ok::<(), IngestError>(())
/// ```
pub struct TableBuilder {
    name: String,
    respondent_type: RespondentType,
    phase: Phase,
    phase_column: Option<String>,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl TableBuilder {
    pub fn new(source_name: &str) -> TableBuilder {
        let respondent_type = RespondentType::from_source_name(source_name);
        let phase = Phase::from_source_name(source_name);
        debug!(
            "TableBuilder::new: {} -> {} / {}",
            source_name, respondent_type, phase
        );
        TableBuilder {
            name: source_name.to_string(),
            respondent_type,
            phase,
            phase_column: None,
            columns: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn respondent_type(&mut self, respondent_type: RespondentType) -> &mut TableBuilder {
        self.respondent_type = respondent_type;
        self
    }

    pub fn phase(&mut self, phase: Phase) -> &mut TableBuilder {
        self.phase = phase;
        self
    }

    /// A column whose answers carry the phase of each record. Records without
    /// a recognisable stage label keep the phase of the source.
    pub fn phase_column(&mut self, column: &str) -> &mut TableBuilder {
        self.phase_column = Some(clean_column_name(column));
        self
    }

    /// Sets the header. Names are cleaned of their markup; empty names become
    /// untitled columns and duplicates get a numeric suffix.
    pub fn columns<S: AsRef<str>>(&mut self, headers: &[S]) -> &mut TableBuilder {
        let mut columns: Vec<String> = Vec::new();
        for (idx, h) in headers.iter().enumerate() {
            let mut name = clean_column_name(h.as_ref());
            if name.is_empty() {
                name = format!("未命名{}", idx + 1);
            }
            if columns.contains(&name) {
                let mut n = 2;
                while columns.contains(&format!("{} ({})", name, n)) {
                    n += 1;
                }
                warn!(
                    "TableBuilder::columns: duplicate column {:?} in {}",
                    name, self.name
                );
                name = format!("{} ({})", name, n);
            }
            columns.push(name);
        }
        self.columns = columns;
        self
    }

    /// Adds one record. Rows shorter than the header are padded with
    /// missing values.
    pub fn add_row<S: AsRef<str>>(&mut self, cells: &[S]) -> Result<(), IngestError> {
        if self.columns.is_empty() {
            return Err(IngestError::NoColumns);
        }
        if cells.len() > self.columns.len() {
            return Err(IngestError::RowTooLong {
                row: self.records.len() + 1,
                cells: cells.len(),
                columns: self.columns.len(),
            });
        }
        let mut phase = self.phase;
        if let Some(pc) = &self.phase_column {
            if let Some(idx) = self.columns.iter().position(|c| c == pc) {
                let from_cell = cells
                    .get(idx)
                    .map(|c| Phase::from_label(c.as_ref()))
                    .unwrap_or(Phase::Unset);
                if from_cell.is_set() {
                    phase = from_cell;
                }
            }
        }
        let mut record = Record::new(self.respondent_type, phase);
        for (column, value) in self.columns.iter().zip(cells.iter()) {
            let value = clean_answer(value.as_ref());
            if !value.is_empty() {
                record.set(column, &value);
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn build(self) -> ResponseTable {
        debug!(
            "TableBuilder::build: {} with {} columns and {} records",
            self.name,
            self.columns.len(),
            self.records.len()
        );
        ResponseTable::new(&self.name, self.columns, self.records)
    }
}

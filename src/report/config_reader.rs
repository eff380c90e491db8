use std::fs;
use std::path::Path;

use crate::report::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use survey_analysis::aliases::AliasTable;
use survey_analysis::similarity::clean_column_name;
use survey_analysis::{AnalysisConfig, AnalysisMode, Phase, RespondentType, Topic};

/// Columns added by the survey platform. They are never analysed.
pub const PLATFORM_COLUMNS: &[&str] = &[
    "IP紀錄",
    "額滿結束註記",
    "使用者紀錄",
    "會員時間",
    "Hash",
    "會員編號",
    "自訂ID",
    "備註",
    "填答時間",
];

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// `csv` or `xlsx`
    pub provider: String,
    #[serde(rename = "respondentType")]
    pub respondent_type: Option<String>,
    pub phase: Option<String>,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
}

impl SourceConfig {
    /// A source given on the command line. The provider follows the
    /// extension of the file.
    pub fn from_path(path: &str) -> SourceConfig {
        let provider = if path.to_lowercase().ends_with(".xlsx") {
            "xlsx"
        } else {
            "csv"
        };
        SourceConfig {
            file_path: path.to_string(),
            provider: provider.to_string(),
            respondent_type: None,
            phase: None,
            worksheet_name: None,
        }
    }

    pub fn respondent_type_override(&self) -> ReportResult<Option<RespondentType>> {
        match self.respondent_type.as_deref() {
            None => Ok(None),
            Some("company") => Ok(Some(RespondentType::Company)),
            Some("investor") => Ok(Some(RespondentType::Investor)),
            Some("unknown") => Ok(Some(RespondentType::Unknown)),
            Some(x) => whatever!("unknown respondent type {:?} for {}", x, self.file_path),
        }
    }

    pub fn phase_override(&self) -> ReportResult<Option<Phase>> {
        match self.phase.as_deref() {
            None => Ok(None),
            Some(x) => match Phase::from_label(x) {
                Phase::Unset => whatever!("unknown phase {:?} for {}", x, self.file_path),
                p => Ok(Some(p)),
            },
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub question: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl TopicConfig {
    fn to_topic(&self) -> Topic {
        Topic {
            question: self.question.clone(),
            title: self.title.clone().unwrap_or_else(|| self.question.clone()),
            description: self.description.clone(),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(rename = "reportTitle")]
    pub report_title: String,
    pub sources: Vec<SourceConfig>,
    /// `topics` or `merged`
    #[serde(rename = "analysisMode")]
    pub analysis_mode: Option<String>,
    #[serde(rename = "phaseColumn")]
    pub phase_column: Option<String>,
    pub topics: Option<Vec<TopicConfig>>,
    #[serde(rename = "topicFile")]
    pub topic_file: Option<String>,
    pub aliases: Option<Vec<(String, String)>>,
    #[serde(rename = "aliasFile")]
    pub alias_file: Option<String>,
    #[serde(rename = "excludedColumns")]
    pub excluded_columns: Option<Vec<String>>,
    #[serde(rename = "metadataPatterns")]
    pub metadata_patterns: Option<Vec<String>>,
    #[serde(rename = "similarityThreshold")]
    pub similarity_threshold: Option<f64>,
    #[serde(rename = "numericThreshold")]
    pub numeric_threshold: Option<f64>,
    #[serde(rename = "fisherTotalThreshold")]
    pub fisher_total_threshold: Option<u64>,
    #[serde(rename = "minExpectedCount")]
    pub min_expected_count: Option<f64>,
    #[serde(rename = "lowExpectedLevel")]
    pub low_expected_level: Option<f64>,
    #[serde(rename = "minGroupSize")]
    pub min_group_size: Option<usize>,
    #[serde(rename = "multiSelectDelimiter")]
    pub multi_select_delimiter: Option<String>,
}

impl ReportConfig {
    /// A configuration with default settings for the given inputs.
    pub fn for_inputs(inputs: &[String]) -> ReportConfig {
        ReportConfig {
            report_title: "Survey report".to_string(),
            sources: inputs.iter().map(|p| SourceConfig::from_path(p)).collect(),
            analysis_mode: Some("merged".to_string()),
            phase_column: None,
            topics: None,
            topic_file: None,
            aliases: None,
            alias_file: None,
            excluded_columns: None,
            metadata_patterns: None,
            similarity_threshold: None,
            numeric_threshold: None,
            fisher_total_threshold: None,
            min_expected_count: None,
            low_expected_level: None,
            min_group_size: None,
            multi_select_delimiter: None,
        }
    }

    /// The library configuration. Relative paths are resolved from `root`.
    pub fn analysis_config(&self, root: &Path) -> ReportResult<AnalysisConfig> {
        let mut res = AnalysisConfig::default();

        let mut excluded: Vec<String> = PLATFORM_COLUMNS.iter().map(|s| s.to_string()).collect();
        excluded.extend(self.excluded_columns.clone().unwrap_or_default());
        if let Some(pc) = &self.phase_column {
            excluded.push(clean_column_name(pc));
        }
        res.excluded_columns = excluded;

        if let Some(patterns) = &self.metadata_patterns {
            res.metadata_patterns.extend(patterns.iter().cloned());
        }

        let mut aliases = AliasTable::new();
        if let Some(f) = &self.alias_file {
            let path = root.join(f);
            for (a, b) in read_alias_file(&path)? {
                aliases.add_pair(&a, &b);
            }
        }
        for (a, b) in self.aliases.clone().unwrap_or_default() {
            aliases.add_pair(&a, &b);
        }
        debug!("analysis_config: {} alias groups", aliases.len());
        res.aliases = aliases;

        if let Some(x) = self.similarity_threshold {
            res.similarity_threshold = x;
        }
        if let Some(x) = self.numeric_threshold {
            res.numeric_threshold = x;
        }
        if let Some(x) = self.fisher_total_threshold {
            res.fisher_total_threshold = x;
        }
        if let Some(x) = self.min_expected_count {
            res.min_expected_count = x;
        }
        if let Some(x) = self.low_expected_level {
            res.low_expected_level = x;
        }
        if let Some(x) = self.min_group_size {
            res.min_group_size = x;
        }
        if let Some(d) = &self.multi_select_delimiter {
            let mut chars = d.chars();
            res.multi_select_delimiter = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => whatever!("the multi-select delimiter must be one character: {:?}", d),
            };
        }
        Ok(res)
    }

    /// The analysis mode, with the topic catalogue in topics mode. Inline
    /// topics come after the ones of the topic file.
    pub fn analysis_mode(&self, root: &Path, mode_override: Option<&str>) -> ReportResult<AnalysisMode> {
        let mode = mode_override
            .map(|s| s.to_string())
            .or_else(|| self.analysis_mode.clone())
            .unwrap_or_else(|| "topics".to_string());
        match mode.as_str() {
            "merged" => Ok(AnalysisMode::Merged),
            "topics" => {
                let mut topics: Vec<Topic> = Vec::new();
                if let Some(f) = &self.topic_file {
                    let path = root.join(f);
                    topics.extend(read_topic_file(&path)?.iter().map(|t| t.to_topic()));
                }
                if let Some(ts) = &self.topics {
                    topics.extend(ts.iter().map(|t| t.to_topic()));
                }
                if topics.is_empty() {
                    whatever!("the topics mode requires topics or a topic file");
                }
                Ok(AnalysisMode::Topics(topics))
            }
            x => whatever!("unknown analysis mode {:?} (expected topics or merged)", x),
        }
    }
}

fn read_json_file(path: &Path) -> ReportResult<JSValue> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })
}

pub fn read_config(path: &Path) -> ReportResult<ReportConfig> {
    let p = path.display().to_string();
    let js = read_json_file(path)?;
    let config: ReportConfig = serde_json::from_value(js).context(ParsingJsonSnafu { path: p })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// Reads a list of pairs of equivalent question texts.
pub fn read_alias_file(path: &Path) -> ReportResult<Vec<(String, String)>> {
    let p = path.display().to_string();
    let js = read_json_file(path)?;
    serde_json::from_value(js).context(ParsingJsonSnafu { path: p })
}

pub fn read_topic_file(path: &Path) -> ReportResult<Vec<TopicConfig>> {
    let p = path.display().to_string();
    let js = read_json_file(path)?;
    serde_json::from_value(js).context(ParsingJsonSnafu { path: p })
}

pub fn read_summary(path: &Path) -> ReportResult<JSValue> {
    let js = read_json_file(path)?;
    debug!("read_summary: {:?}", js);
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_config() {
        let js = r#"{
            "reportTitle": "Governance",
            "sources": [
                { "filePath": "a.csv", "provider": "csv" },
                { "filePath": "b.xlsx", "provider": "xlsx", "respondentType": "investor", "phase": "第二階段" }
            ],
            "analysisMode": "merged",
            "phaseColumn": "公司目前所處階段",
            "aliases": [["a", "b"]],
            "excludedColumns": ["x"],
            "similarityThreshold": 0.8
        }"#;
        let config: ReportConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(
            config.sources[1].respondent_type_override().unwrap(),
            Some(RespondentType::Investor)
        );
        assert_eq!(config.sources[1].phase_override().unwrap(), Some(Phase::Phase2));

        let ac = config.analysis_config(Path::new(".")).unwrap();
        assert!(ac.is_excluded("填答時間"));
        assert!(ac.is_excluded("x"));
        assert!(ac.is_excluded("公司目前所處階段"));
        assert_eq!(ac.aliases.aliases_of("a"), vec!["b"]);
        assert_eq!(ac.similarity_threshold, 0.8);
        assert_eq!(
            config.analysis_mode(Path::new("."), None).unwrap(),
            AnalysisMode::Merged
        );
        assert!(config.analysis_mode(Path::new("."), Some("topics")).is_err());
    }

    #[test]
    fn tagged_phase_column_is_excluded_by_its_clean_name() {
        let mut config = ReportConfig::for_inputs(&["a.csv".to_string()]);
        config.phase_column = Some("【必填】公司目前所處階段".to_string());
        let ac = config.analysis_config(Path::new(".")).unwrap();
        assert!(ac.is_excluded("公司目前所處階段"));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut s = SourceConfig::from_path("data/投資方.XLSX");
        assert_eq!(s.provider, "xlsx");
        s.respondent_type = Some("board".to_string());
        assert!(s.respondent_type_override().is_err());
        s.phase = Some("later".to_string());
        assert!(s.phase_override().is_err());
    }
    #[test]
    fn example_config_with_topic_and_alias_files() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/config.example.json");
        let config = read_config(&path).unwrap();
        let root = path.parent().unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(
            config.sources[2].worksheet_name.as_deref(),
            Some("回覆")
        );
        let ac = config.analysis_config(root).unwrap();
        assert!(ac.is_excluded("公司名稱"));
        assert!(ac.is_excluded("公司階段"));
        assert_eq!(ac.aliases.aliases_of("董事會召開頻率"), vec!["董事會開會頻率"]);
        match config.analysis_mode(root, None).unwrap() {
            AnalysisMode::Topics(topics) => {
                assert_eq!(topics.len(), 5);
                assert_eq!(topics[1].title, "Board size");
                assert_eq!(topics[2].description, None);
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }
}

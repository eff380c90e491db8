mod config;

pub mod aliases;
pub mod artifacts;
pub mod builder;
pub mod categories;
pub mod crosstab;
pub mod manual;
pub mod merger;
pub mod report;
pub mod resolver;
pub mod similarity;
pub mod stats;

use log::info;

pub use crate::config::*;
pub use crate::report::{AnalysisMode, SurveyReport, Topic};

/// Runs the whole analysis on the given tables.
///
/// Arguments:
/// * `tables` the response tables, one per source, with their respondent and
/// phase tags already set
/// * `mode` whether to resolve a catalogue of topics or to merge the similar
/// questions of all the tables
/// * `config` thresholds, exclusions and aliases
///
/// Only a bad configuration or an empty survey is an error. Questions that
/// cannot be found, tested or analysed are reported as such in the result.
pub fn run_survey_analysis(
    tables: &[ResponseTable],
    mode: &AnalysisMode,
    config: &AnalysisConfig,
) -> Result<SurveyReport, AnalysisError> {
    info!(
        "Processing {} tables with {} records, mode: {}",
        tables.len(),
        tables.iter().map(|t| t.len()).sum::<usize>(),
        match mode {
            AnalysisMode::Topics(t) => format!("{} topics", t.len()),
            AnalysisMode::Merged => "merged".to_string(),
        }
    );
    let report = report::build_report(tables, mode, config)?;
    info!(
        "run_survey_analysis: {} questions, {} key findings",
        report.questions.len(),
        report.overview.key_findings.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::AliasTable;
    use crate::builder::TableBuilder;
    use crate::report::QuestionOutcome;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> ResponseTable {
        let mut b = TableBuilder::new(name);
        b.columns(columns);
        for r in rows.iter() {
            b.add_row(*r).unwrap();
        }
        b.build()
    }

    #[test]
    fn aliases_resolve_investor_phrasings() {
        init();
        let tables = vec![
            table("公司問卷.csv", &["董事會是否設有獨立董事"], &[&["是"], &["否"]]),
            table("投資方問卷.csv", &["被投資公司是否有獨董"], &[&["是"]]),
        ];
        let config = AnalysisConfig {
            aliases: AliasTable::from_pairs(vec![("董事會是否設有獨立董事", "被投資公司是否有獨董")]),
            ..AnalysisConfig::default()
        };
        let mode = AnalysisMode::Topics(vec![Topic::new("董事會是否設有獨立董事", "Independent directors")]);
        let report = run_survey_analysis(&tables, &mode, &config).unwrap();
        let q = &report.questions[0];
        let strategies: Vec<&str> = q.sources.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(strategies, vec!["exact", "alias"]);
        assert_eq!(q.answered, 3);
        assert!(matches!(q.outcome, QuestionOutcome::Analyzed(_)));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        init();
        let tables = vec![table("公司問卷.csv", &["q"], &[&["是"]])];
        let config = AnalysisConfig {
            similarity_threshold: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            run_survey_analysis(&tables, &AnalysisMode::Merged, &config),
            Err(AnalysisError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn every_topic_is_reported() {
        init();
        let tables = vec![table(
            "公司問卷第一階段.csv",
            &["大股東合計持股比例", "未命名2"],
            &[&["50-60%", ""], &["10-20%", ""]],
        )];
        let mode = AnalysisMode::Topics(vec![
            Topic::new("大股東合計持股比例", "Major shareholders"),
            Topic::new("未命名2", "Empty"),
        ]);
        let report = run_survey_analysis(&tables, &mode, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.questions[1].outcome, QuestionOutcome::NotPresent);
        assert_eq!(report.overview.phases.len(), 1);
    }
}

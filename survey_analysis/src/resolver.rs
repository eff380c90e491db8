use log::{debug, info, warn};

use crate::config::{AnalysisConfig, ResponseTable};
use crate::similarity::light_normalize;

/// Why a question could not be found in a table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NoMatchReason {
    /// The question is an administrative field and is never analysed.
    Metadata,
    /// No column of the table corresponds to the question.
    NotFound,
}

/// The outcome of looking up a canonical question in one table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Resolution {
    /// The question text is a column with data.
    Exact(String),
    /// A curated alias of the question is a column with data.
    Alias(String),
    /// A column has the same light-normalized text.
    Normalized(String),
    /// Every word of the question appears in the column name. Weakest match.
    TokenFallback(String),
    NoMatch(NoMatchReason),
}

impl Resolution {
    pub fn column(&self) -> Option<&str> {
        match self {
            Resolution::Exact(c)
            | Resolution::Alias(c)
            | Resolution::Normalized(c)
            | Resolution::TokenFallback(c) => Some(c.as_str()),
            Resolution::NoMatch(_) => None,
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            Resolution::Exact(_) => "exact",
            Resolution::Alias(_) => "alias",
            Resolution::Normalized(_) => "normalized",
            Resolution::TokenFallback(_) => "token fallback",
            Resolution::NoMatch(NoMatchReason::Metadata) => "metadata",
            Resolution::NoMatch(NoMatchReason::NotFound) => "not found",
        }
    }
}

fn candidate_columns<'a>(
    table: &'a ResponseTable,
    config: &'a AnalysisConfig,
) -> impl Iterator<Item = &'a String> + 'a {
    table
        .columns()
        .iter()
        .filter(move |c| !config.is_excluded(c) && !config.is_metadata(c) && table.has_data(c))
}

/// Finds the column of `table` holding the answers to the canonical question
/// `target`.
///
/// Strategies are tried from the most to the least reliable: exact name,
/// curated alias, light-normalized equality and finally token containment.
/// Administrative questions are rejected before any lookup.
pub fn resolve(table: &ResponseTable, target: &str, config: &AnalysisConfig) -> Resolution {
    if config.is_metadata(target) {
        debug!("resolve: {:?} is an administrative question", target);
        return Resolution::NoMatch(NoMatchReason::Metadata);
    }

    if table.has_data(target) {
        return Resolution::Exact(target.to_string());
    }

    for alias in config.aliases.aliases_of(target) {
        if table.has_data(alias) && !config.is_excluded(alias) {
            debug!("resolve: {:?} -> {:?} (alias)", target, alias);
            return Resolution::Alias(alias.to_string());
        }
    }

    let light_target = light_normalize(target);
    if !light_target.is_empty() {
        if let Some(c) = candidate_columns(table, config).find(|c| light_normalize(c) == light_target)
        {
            debug!("resolve: {:?} -> {:?} (normalized)", target, c);
            return Resolution::Normalized(c.clone());
        }
    }

    let tokens: Vec<&str> = light_target.split_whitespace().collect();
    if !tokens.is_empty() {
        let found = candidate_columns(table, config).find(|c| {
            let light = light_normalize(c);
            tokens.iter().all(|t| light.contains(t))
        });
        if let Some(c) = found {
            if tokens.len() == 1 {
                warn!(
                    "resolve: weak fallback match in {}: {:?} -> {:?} (single token)",
                    table.name(),
                    target,
                    c
                );
            } else {
                info!(
                    "resolve: fallback match in {}: {:?} -> {:?}",
                    table.name(),
                    target,
                    c
                );
            }
            return Resolution::TokenFallback(c.clone());
        }
    }

    debug!("resolve: {:?} not found in {}", target, table.name());
    Resolution::NoMatch(NoMatchReason::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::AliasTable;
    use crate::builder::TableBuilder;

    fn table(columns: &[&str], rows: &[&[&str]]) -> ResponseTable {
        let mut b = TableBuilder::new("公司問卷第一階段.csv");
        b.columns(columns);
        for r in rows.iter() {
            b.add_row(*r).unwrap();
        }
        b.build()
    }

    #[test]
    fn exact_match_wins() {
        let t = table(
            &["董事會成員人數", "請問貴公司董事會成員人數", "董事人數"],
            &[&["5", "7", "9"]],
        );
        let config = AnalysisConfig {
            aliases: AliasTable::from_pairs(vec![("董事會成員人數", "董事人數")]),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            resolve(&t, "董事會成員人數", &config),
            Resolution::Exact("董事會成員人數".to_string())
        );
        assert_eq!(
            resolve(&t, "董事人數", &config),
            Resolution::Exact("董事人數".to_string())
        );
    }

    #[test]
    fn exact_column_without_data_is_skipped() {
        let t = table(
            &["董事會成員人數", "請問貴公司董事會成員人數"],
            &[&["", "7"]],
        );
        let config = AnalysisConfig::default();
        assert_eq!(
            resolve(&t, "董事會成員人數", &config),
            Resolution::Normalized("請問貴公司董事會成員人數".to_string())
        );
    }

    #[test]
    fn alias_before_normalization() {
        let t = table(&["董事人數", "請問貴公司董事會成員人數"], &[&["5", "7"]]);
        let config = AnalysisConfig {
            aliases: AliasTable::from_pairs(vec![("董事會成員人數", "董事人數")]),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            resolve(&t, "董事會成員人數", &config),
            Resolution::Alias("董事人數".to_string())
        );
    }

    #[test]
    fn token_fallback() {
        let t = table(&["Board size of the company (2023)"], &[&["5"]]);
        let config = AnalysisConfig::default();
        let r = resolve(&t, "size board", &config);
        assert_eq!(r.column(), Some("Board size of the company (2023)"));
        assert_eq!(r.strategy(), "token fallback");
    }

    #[test]
    fn token_fallback_uses_light_forms() {
        let t = table(&["董事會成員人數", "ＣＥＯ任期"], &[&["5", "3"]]);
        let config = AnalysisConfig::default();
        assert_eq!(
            resolve(&t, "請問貴公司 董事會 人數", &config),
            Resolution::TokenFallback("董事會成員人數".to_string())
        );
        assert_eq!(
            resolve(&t, "CEO 任期", &config),
            Resolution::TokenFallback("ＣＥＯ任期".to_string())
        );
    }

    #[test]
    fn metadata_is_never_resolved() {
        let t = table(
            &["Please state the name of the company you represent", "其他"],
            &[&["ACME", "x"]],
        );
        let config = AnalysisConfig::default();
        assert_eq!(
            resolve(
                &t,
                "Please state the name of the company you represent",
                &config
            ),
            Resolution::NoMatch(NoMatchReason::Metadata)
        );
    }

    #[test]
    fn metadata_columns_are_not_fallback_candidates() {
        let t = table(&["公司名稱 name"], &[&["ACME"]]);
        let config = AnalysisConfig::default();
        assert_eq!(
            resolve(&t, "name", &config),
            Resolution::NoMatch(NoMatchReason::NotFound)
        );
    }

    #[test]
    fn excluded_columns_are_skipped() {
        let t = table(&["備註 董事"], &[&["x"]]);
        let config = AnalysisConfig {
            excluded_columns: vec!["備註 董事".to_string()],
            ..AnalysisConfig::default()
        };
        assert_eq!(resolve(&t, "董事", &config).column(), None);
    }
}

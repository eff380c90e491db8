use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};

use crate::config::AnalysisConfig;
use crate::crosstab::{CrossTab, GroupLabel, OptionTable};
use crate::stats::methods::{
    chi_square, cohens_d, cramers_v, fisher_exact, kruskal_wallis, mann_whitney_u,
};
use crate::stats::{Abstention, EffectSize, TestMethod, TestOutcome, TestResult, VariableKind};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}

// Failures inside a test are reported as an abstention, never propagated.
fn guarded<F: FnOnce() -> TestOutcome>(name: &str, f: F) -> TestOutcome {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = panic_message(payload);
            warn!("{}: computation failed: {}", name, msg);
            Err(Abstention::ComputationFailed(msg))
        }
    }
}

/// Parses a numeric answer. Thousands separators and surrounding spaces are
/// accepted.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Decides how a question is analysed from its (non-missing) answers.
///
/// Answers containing the multi-select delimiter make the question
/// multi-select. Otherwise it is numeric when enough answers parse as
/// numbers, and categorical in all the other cases.
pub fn classify(values: &[&str], config: &AnalysisConfig) -> VariableKind {
    if values.is_empty() {
        return VariableKind::Categorical;
    }
    if values
        .iter()
        .any(|v| v.trim().contains(config.multi_select_delimiter))
    {
        return VariableKind::MultiSelect;
    }
    let parsed = values.iter().filter(|v| parse_number(v).is_some()).count();
    let fraction = parsed as f64 / values.len() as f64;
    if fraction >= config.numeric_threshold {
        VariableKind::Numeric
    } else {
        VariableKind::Categorical
    }
}

fn check_group_sizes(
    groups: &[GroupLabel],
    sizes: &[usize],
    config: &AnalysisConfig,
) -> Result<(), Abstention> {
    let present: Vec<(GroupLabel, usize)> = groups
        .iter()
        .zip(sizes.iter())
        .filter(|(_, s)| **s > 0)
        .map(|(g, s)| (*g, *s))
        .collect();
    if present.len() < 2 {
        return Err(Abstention::TooFewGroups {
            found: present.len(),
        });
    }
    if let Some((g, s)) = present.iter().find(|(_, s)| *s < config.min_group_size) {
        return Err(Abstention::GroupTooSmall {
            group: g.to_string(),
            size: *s,
            required: config.min_group_size,
        });
    }
    Ok(())
}

/// Tests the independence of categories and groups.
///
/// Small 2x2 tables use the Fisher exact test, all the others the chi-square
/// test. The test is not performed when a group is too small or when an
/// expected count is too low.
pub fn test_categorical(table: &CrossTab, config: &AnalysisConfig) -> TestOutcome {
    guarded("test_categorical", || {
        let sizes: Vec<usize> = (0..table.groups().len())
            .map(|j| table.column_total(j) as usize)
            .collect();
        check_group_sizes(table.groups(), &sizes, config)?;

        // Empty rows and columns carry no information.
        let cols: Vec<usize> = (0..sizes.len()).filter(|j| sizes[*j] > 0).collect();
        let counts: Vec<Vec<u64>> = (0..table.categories().len())
            .filter(|i| table.row_total(*i) > 0)
            .map(|i| cols.iter().map(|j| table.count(i, *j)).collect())
            .collect();
        if counts.len() < 2 {
            return Err(Abstention::SingleCategory);
        }
        let n: u64 = counts.iter().flatten().sum();
        let (rows, ncols) = (counts.len(), cols.len());

        if rows == 2 && ncols == 2 && n < config.fisher_total_threshold {
            let (odds, p) = fisher_exact(counts[0][0], counts[0][1], counts[1][0], counts[1][1]);
            let effect = chi_square(&counts)
                .and_then(|c| cramers_v(c.uncorrected, n, rows, ncols))
                .map(EffectSize::CramersV);
            debug!("test_categorical: fisher n={} p={}", n, p);
            return Ok(TestResult {
                method: TestMethod::FisherExact,
                statistic: odds,
                p_value: p,
                dof: None,
                effect_size: effect,
                low_expected_fraction: None,
            });
        }

        let ct = CrossTab::from_counts(
            (0..rows).map(|i| i.to_string()).collect(),
            cols.iter().map(|j| table.groups()[*j]).collect(),
            counts.clone(),
        )
        .ok_or_else(|| Abstention::ComputationFailed("inconsistent table".to_string()))?;
        let expected: Vec<f64> = ct.expected().into_iter().flatten().collect();
        let min_expected = expected.iter().cloned().fold(f64::INFINITY, f64::min);
        if min_expected <= config.min_expected_count {
            return Err(Abstention::SparseCells { min_expected });
        }
        let low = expected
            .iter()
            .filter(|e| **e < config.low_expected_level)
            .count();
        let result = chi_square(&counts)
            .ok_or_else(|| Abstention::ComputationFailed("empty margin".to_string()))?;
        debug!(
            "test_categorical: chi-square {}x{} stat={} p={}",
            rows, ncols, result.statistic, result.p_value
        );
        Ok(TestResult {
            method: TestMethod::ChiSquare,
            statistic: result.statistic,
            p_value: result.p_value,
            dof: Some(result.dof),
            effect_size: cramers_v(result.uncorrected, n, rows, ncols).map(EffectSize::CramersV),
            low_expected_fraction: Some(low as f64 / expected.len() as f64),
        })
    })
}

/// Compares numeric answers across groups: Mann-Whitney U for two groups,
/// Kruskal-Wallis H for more.
pub fn test_numeric(groups: &[(GroupLabel, Vec<f64>)], config: &AnalysisConfig) -> TestOutcome {
    guarded("test_numeric", || {
        let labels: Vec<GroupLabel> = groups.iter().map(|(g, _)| *g).collect();
        let sizes: Vec<usize> = groups.iter().map(|(_, v)| v.len()).collect();
        check_group_sizes(&labels, &sizes, config)?;
        let samples: Vec<&Vec<f64>> = groups
            .iter()
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
            .collect();
        let first = samples[0][0];
        if samples.iter().all(|v| v.iter().all(|x| *x == first)) {
            return Err(Abstention::AllValuesIdentical);
        }
        if samples.len() == 2 {
            let (u, p) =
                mann_whitney_u(samples[0], samples[1]).ok_or(Abstention::AllValuesIdentical)?;
            Ok(TestResult {
                method: TestMethod::MannWhitneyU,
                statistic: u,
                p_value: p,
                dof: None,
                effect_size: cohens_d(samples[0], samples[1]).map(EffectSize::CohensD),
                low_expected_fraction: None,
            })
        } else {
            let owned: Vec<Vec<f64>> = samples.iter().map(|v| v.to_vec()).collect();
            let (h, p) = kruskal_wallis(&owned).ok_or(Abstention::AllValuesIdentical)?;
            Ok(TestResult {
                method: TestMethod::KruskalWallis,
                statistic: h,
                p_value: p,
                dof: Some((owned.len() - 1) as u32),
                effect_size: None,
                low_expected_fraction: None,
            })
        }
    })
}

/// Tests each option of a multi-select question on its own selected / not
/// selected table.
pub fn test_multi_select(table: &OptionTable, config: &AnalysisConfig) -> Vec<(String, TestOutcome)> {
    table
        .options()
        .iter()
        .enumerate()
        .map(|(i, o)| (o.clone(), test_categorical(&table.option_crosstab(i), config)))
        .collect()
}

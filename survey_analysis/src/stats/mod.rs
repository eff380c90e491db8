//! Significance testing of grouped survey answers.

pub mod distributions;
pub mod methods;
mod selector;

use std::fmt::Display;

pub use selector::{classify, parse_number, test_categorical, test_multi_select, test_numeric};

/// How the answers of a question are analysed.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum VariableKind {
    Categorical,
    Numeric,
    MultiSelect,
}

impl VariableKind {
    pub fn label(&self) -> &'static str {
        match self {
            VariableKind::Categorical => "categorical",
            VariableKind::Numeric => "numeric",
            VariableKind::MultiSelect => "multi-select",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TestMethod {
    ChiSquare,
    FisherExact,
    MannWhitneyU,
    KruskalWallis,
}

impl TestMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TestMethod::ChiSquare => "chi-square test",
            TestMethod::FisherExact => "Fisher's exact test",
            TestMethod::MannWhitneyU => "Mann-Whitney U test",
            TestMethod::KruskalWallis => "Kruskal-Wallis H test",
        }
    }

    pub fn statistic_symbol(&self) -> &'static str {
        match self {
            TestMethod::ChiSquare => "χ²",
            TestMethod::FisherExact => "odds ratio",
            TestMethod::MannWhitneyU => "U",
            TestMethod::KruskalWallis => "H",
        }
    }
}

impl Display for TestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Magnitude {
    Negligible,
    Small,
    Medium,
    Large,
}

impl Magnitude {
    pub fn label(&self) -> &'static str {
        match self {
            Magnitude::Negligible => "negligible",
            Magnitude::Small => "small",
            Magnitude::Medium => "medium",
            Magnitude::Large => "large",
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum EffectSize {
    CramersV(f64),
    CohensD(f64),
}

impl EffectSize {
    pub fn value(&self) -> f64 {
        match self {
            EffectSize::CramersV(v) | EffectSize::CohensD(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EffectSize::CramersV(_) => "Cramér's V",
            EffectSize::CohensD(_) => "Cohen's d",
        }
    }

    pub fn magnitude(&self) -> Magnitude {
        let (v, bands) = match self {
            EffectSize::CramersV(v) => (v.abs(), [0.1, 0.3, 0.5]),
            EffectSize::CohensD(d) => (d.abs(), [0.2, 0.5, 0.8]),
        };
        if v < bands[0] {
            Magnitude::Negligible
        } else if v < bands[1] {
            Magnitude::Small
        } else if v < bands[2] {
            Magnitude::Medium
        } else {
            Magnitude::Large
        }
    }
}

/// The significance tier of a p-value.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum SignificanceTier {
    NotSignificant,
    Significant,
    HighlySignificant,
    VeryHighlySignificant,
}

impl SignificanceTier {
    pub fn from_p_value(p: f64) -> SignificanceTier {
        if p < 0.001 {
            SignificanceTier::VeryHighlySignificant
        } else if p < 0.01 {
            SignificanceTier::HighlySignificant
        } else if p < 0.05 {
            SignificanceTier::Significant
        } else {
            SignificanceTier::NotSignificant
        }
    }

    /// 0 for not significant, up to 3 for p < 0.001.
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn marker(&self) -> &'static str {
        match self {
            SignificanceTier::NotSignificant => "n.s.",
            SignificanceTier::Significant => "*",
            SignificanceTier::HighlySignificant => "**",
            SignificanceTier::VeryHighlySignificant => "***",
        }
    }

    pub fn is_significant(&self) -> bool {
        *self != SignificanceTier::NotSignificant
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct TestResult {
    pub method: TestMethod,
    pub statistic: f64,
    pub p_value: f64,
    pub dof: Option<u32>,
    pub effect_size: Option<EffectSize>,
    /// Share of the cells with a low expected count (chi-square only).
    pub low_expected_fraction: Option<f64>,
}

impl TestResult {
    pub fn tier(&self) -> SignificanceTier {
        SignificanceTier::from_p_value(self.p_value)
    }
}

/// Why no test was run on a table.
#[derive(PartialEq, Debug, Clone)]
pub enum Abstention {
    /// Fewer than two groups have answers.
    TooFewGroups { found: usize },
    /// A group has too few respondents for a meaningful comparison.
    GroupTooSmall {
        group: String,
        size: usize,
        required: usize,
    },
    /// Every respondent gave the same category.
    SingleCategory,
    /// An expected cell count is too low for the chi-square approximation.
    SparseCells { min_expected: f64 },
    /// Every numeric value is the same; rank tests are not applicable.
    AllValuesIdentical,
    /// The computation failed unexpectedly.
    ComputationFailed(String),
}

impl Display for Abstention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Abstention::TooFewGroups { found } => {
                write!(f, "only {} group(s) with answers, at least 2 are needed", found)
            }
            Abstention::GroupTooSmall {
                group,
                size,
                required,
            } => write!(
                f,
                "group {} has {} respondent(s), at least {} are needed",
                group, size, required
            ),
            Abstention::SingleCategory => write!(f, "all the answers fall in a single category"),
            Abstention::SparseCells { min_expected } => write!(
                f,
                "the smallest expected count ({:.2}) is too low",
                min_expected
            ),
            Abstention::AllValuesIdentical => write!(f, "all the values are identical"),
            Abstention::ComputationFailed(msg) => write!(f, "the computation failed: {}", msg),
        }
    }
}

/// The outcome of a significance test: a result, or the reason why the test
/// was not performed.
pub type TestOutcome = Result<TestResult, Abstention>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers() {
        assert_eq!(SignificanceTier::from_p_value(0.0005).level(), 3);
        assert_eq!(SignificanceTier::from_p_value(0.001).level(), 2);
        assert_eq!(SignificanceTier::from_p_value(0.03).marker(), "*");
        assert_eq!(
            SignificanceTier::from_p_value(0.05),
            SignificanceTier::NotSignificant
        );
    }

    #[test]
    fn effect_bands() {
        assert_eq!(EffectSize::CramersV(0.05).magnitude(), Magnitude::Negligible);
        assert_eq!(EffectSize::CramersV(0.3).magnitude(), Magnitude::Medium);
        assert_eq!(EffectSize::CohensD(-0.9).magnitude(), Magnitude::Large);
        assert_eq!(EffectSize::CohensD(0.3).magnitude(), Magnitude::Small);
    }
}

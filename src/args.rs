use clap::Parser;

/// This is a report generator for multi-source survey tables.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the survey: sources, analysis mode, topics and aliases.
    /// Relative paths in this file are resolved from its directory.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, repeatable) Input tables (CSV or XLSX). Setting this option replaces the sources
    /// listed in the --config file.
    #[clap(short, long, value_parser)]
    pub input: Vec<String>,

    /// (topics or merged) Overrides the analysis mode of the configuration. Without a configuration
    /// file, the default is merged.
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the report. Defaults to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (json or markdown, default json) The format of the report.
    #[clap(short, long, value_parser)]
    pub format: Option<String>,

    /// (file path) A reference JSON summary. If provided, the program checks that the computed
    /// summary matches it and fails otherwise.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

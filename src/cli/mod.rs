//! Command-line interface for deseq_report

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ReportConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "deseq_report")]
#[command(version)]
#[command(about = "Differential expression report with DESeq2 statistics")]
#[command(
    long_about = "Differential expression report with DESeq2 statistics.\n\n\
        Without a subcommand, runs `report` with the default inputs\n\
        (counts.tsv.gz and design.csv in the working directory)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit the model and write the HTML report
    #[command(
        about = "Fit the model and write the HTML report",
        long_about = "Fit the model and write the HTML report\n\n\
            Reads the count matrix and sample design, aligns them by sample ID,\n\
            fits the negative binomial GLM for ~ condition, runs the Wald test\n\
            and the variance stabilizing transform, and writes one HTML file\n\
            with the results summary, a top-genes table and seven figures.",
        after_long_help = "\
Examples:
  # Defaults: counts.tsv.gz + design.csv -> report.html
  deseq_report report

  # Explicit inputs and contrast
  deseq_report report -c counts.tsv.gz -d design.csv --condition treatment \\
    --numerator drug --denominator placebo -o drug_vs_placebo.html

  # Settings from a JSON file, with one override, plus the full results table
  deseq_report report --config report.json --alpha 0.05 --results results.tsv"
    )]
    Report(ReportArgs),
}

/// Flags of the `report` subcommand. Each one that is given overrides the
/// configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct ReportArgs {
    /// JSON configuration file
    #[arg(long, value_name = "FILE",
        long_help = "JSON configuration file.\n\
            Any field of the configuration may be given; missing fields take their defaults.\n\
            Command-line flags override the file.")]
    pub config: Option<PathBuf>,

    /// Gzip-compressed count matrix [default: counts.tsv.gz]
    #[arg(short, long, value_name = "FILE",
        long_help = "Gzip-compressed count matrix.\n\
            Format: first column = gene IDs, header = sample IDs, tab-separated raw counts.\n\
            Uncompressed and comma-separated files are also accepted.")]
    pub counts: Option<PathBuf>,

    /// Sample design CSV [default: design.csv]
    #[arg(short, long, value_name = "FILE",
        long_help = "Comma-separated sample design with a header row.\n\
            The first column holds the sample IDs unless --sample-column is given.")]
    pub design: Option<PathBuf>,

    /// Output HTML report [default: report.html]
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also write the full results table as TSV
    #[arg(long, value_name = "FILE")]
    pub results: Option<PathBuf>,

    /// Design column holding the sample IDs
    #[arg(long, value_name = "COLUMN")]
    pub sample_column: Option<String>,

    /// Design column to test [default: condition]
    #[arg(long, value_name = "COLUMN")]
    pub condition: Option<String>,

    /// Numerator level of the contrast
    #[arg(long,
        long_help = "Numerator level of the contrast (the \"treatment\" condition).\n\
            Without --numerator/--denominator, the first non-reference level is\n\
            compared against the reference level.")]
    pub numerator: Option<String>,

    /// Denominator level of the contrast
    #[arg(long)]
    pub denominator: Option<String>,

    /// Reference level of the condition
    #[arg(long, value_name = "LEVEL",
        long_help = "Reference level of the condition.\n\
            Without this, the alphabetically first level is the reference.")]
    pub reference: Option<String>,

    /// Significance level for independent filtering [default: 0.1]
    #[arg(short, long)]
    pub alpha: Option<f64>,

    /// Adjusted p-value below which genes are highlighted [default: 0.01]
    #[arg(long)]
    pub highlight_padj: Option<f64>,

    /// Genes in each gene heatmap and in the top-genes table [default: 20]
    #[arg(long)]
    pub top_genes: Option<usize>,

    /// Most variable genes used for PCA [default: 500]
    #[arg(long)]
    pub pca_ntop: Option<usize>,

    /// Report title
    #[arg(long)]
    pub title: Option<String>,

    /// Number of threads (0 = auto) [default: 0]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

impl ReportArgs {
    /// Configuration from `--config` (or the defaults) with the given flags applied
    pub fn to_config(&self) -> Result<ReportConfig> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::from_json_file(path)?,
            None => ReportConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut ReportConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }
        set(&mut config.counts, &self.counts);
        set(&mut config.design, &self.design);
        set(&mut config.output, &self.output);
        set_opt(&mut config.results, &self.results);
        set_opt(&mut config.sample_column, &self.sample_column);
        set(&mut config.condition_column, &self.condition);
        set_opt(&mut config.numerator, &self.numerator);
        set_opt(&mut config.denominator, &self.denominator);
        set_opt(&mut config.reference_level, &self.reference);
        set(&mut config.alpha, &self.alpha);
        set(&mut config.highlight_padj, &self.highlight_padj);
        set(&mut config.top_genes, &self.top_genes);
        set(&mut config.pca_ntop, &self.pca_ntop);
        set(&mut config.title, &self.title);
        set(&mut config.threads, &self.threads);
    }
}

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use compliance_report::fonts::{self, FontResolver};
use compliance_report::pipeline::{
    FloorPlan, PrecomputedAnalysis, RegulationSource, ReportPipeline, ReviewOutcome,
};
use compliance_report::{ReportConfig, ReportLabels};
use log::warn;
use tracing_subscriber::EnvFilter;

/// Builds building-code review reports from regulation PDFs and an analysis text.
///
/// Fonts able to display Korean text are looked up next to the executable (`fonts/NanumGothic.ttf`
/// or `NanumGothic.ttf`), in `COMPLIANCE_REPORT_FONTS_DIR`, and in the Windows font folder. The
/// fallback family needs Liberation Sans metric files, see `COMPLIANCE_REPORT_DEFAULT_FONTS_DIR`.
#[derive(Parser)]
#[command(author, version, about = "Building-code compliance report generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the aggregated text of one or more regulation PDFs.
    #[command(name = "extract")]
    Extract {
        /// Regulation PDFs, in order.
        #[arg(required = true)]
        regulations: Vec<PathBuf>,
    },

    /// Show which font the report would be rendered with.
    #[command(name = "fonts", alias = "font")]
    Fonts,

    /// Render the review report for a floor plan.
    #[command(name = "build")]
    Build {
        /// Regulation PDF; repeat for several documents.
        #[arg(long = "regulation", short = 'r', required = true)]
        regulations: Vec<PathBuf>,

        /// File holding the analysis text returned by the review service.
        #[arg(long, short = 'a')]
        analysis: PathBuf,

        /// The analysed floor plan image.
        #[arg(long, short = 'p')]
        plan: PathBuf,

        /// Where to write the PDF.
        #[arg(long, short = 'o', default_value = "analysis_result.pdf")]
        output: PathBuf,

        /// Use the Korean report labels.
        #[arg(long)]
        korean: bool,

        /// Print page numbers in the footer.
        #[arg(long)]
        page_numbers: bool,

        /// Strip dates and document IDs so identical inputs render identical bytes.
        #[arg(long)]
        reproducible: bool,

        /// Fixed timestamp instead of the current local time.
        #[arg(long)]
        timestamp: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract { regulations } => run_extract(&regulations),
        Commands::Fonts => run_fonts(),
        Commands::Build {
            regulations,
            analysis,
            plan,
            output,
            korean,
            page_numbers,
            reproducible,
            timestamp,
        } => {
            let labels = if korean {
                ReportLabels::korean()
            } else {
                ReportLabels::default()
            };
            let config = ReportConfig::from_env()
                .with_labels(labels)
                .with_page_numbers(page_numbers)
                .with_reproducible(reproducible);
            let timestamp = timestamp
                .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
            run_build(config, &regulations, &analysis, &plan, &output, &timestamp)
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn load_sources(paths: &[PathBuf]) -> Result<Vec<RegulationSource>, Box<dyn Error>> {
    paths
        .iter()
        .map(|path| RegulationSource::from_path(path).map_err(Into::into))
        .collect()
}

fn report_failures(outcome_failures: &[compliance_report::pipeline::ExtractionFailure]) {
    for failure in outcome_failures {
        warn!("{} was skipped: {}", failure.name, failure.error);
    }
}

fn run_extract(paths: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let pipeline = ReportPipeline::new(ReportConfig::from_env());
    let corpus = pipeline.collect_regulations(&load_sources(paths)?);
    report_failures(corpus.failures());

    if corpus.is_empty() {
        return Err("no text could be extracted from the regulation PDFs".into());
    }
    println!("{}", corpus.text());
    Ok(())
}

fn run_fonts() -> Result<(), Box<dyn Error>> {
    let config = ReportConfig::from_env();
    let resolver = FontResolver::from_config(&config);

    for candidate in resolver.candidates() {
        let marker = if candidate.path().exists() { "found" } else { "missing" };
        println!(
            "{:<8} {} ({})",
            marker,
            candidate.name(),
            candidate.path().display()
        );
    }

    match resolver.resolve() {
        Some(asset) => println!("Report font: {} ({})", asset.name(), asset.path().display()),
        None => {
            println!(
                "No candidate font found; reports use {}.",
                fonts::DEFAULT_FONT_NAME
            );
            if !fonts::default_fonts_available(config.default_fonts_dir()) {
                println!("Warning: the default font metrics are not installed either.");
            }
        }
    }
    Ok(())
}

fn run_build(
    config: ReportConfig,
    regulations: &[PathBuf],
    analysis: &Path,
    plan: &Path,
    output: &Path,
    timestamp: &str,
) -> Result<(), Box<dyn Error>> {
    let service = PrecomputedAnalysis::from_file(analysis)?;
    let plan_name = plan
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown.png".to_owned());
    let plan = FloorPlan::new(plan_name, fs::read(plan)?);

    let pipeline = ReportPipeline::new(config);
    let outcome = pipeline.review(&service, &plan, &load_sources(regulations)?, timestamp)?;

    match outcome {
        ReviewOutcome::NoRegulationText(corpus) => {
            report_failures(corpus.failures());
            Err("no text could be extracted from the regulation PDFs".into())
        }
        ReviewOutcome::Completed { corpus, report, .. } => {
            report_failures(corpus.failures());
            fs::write(output, &report.bytes)?;
            println!(
                "Generated {} ({} bytes, {}, font {})",
                output.display(),
                report.bytes.len(),
                report.mime_type,
                report.document.base_font()
            );
            Ok(())
        }
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

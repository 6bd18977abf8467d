//! End-to-end review flow: extract the regulations, ask the analysis service, render the report.
//!
//! The pipeline owns none of the inputs. Regulation documents are extracted independently, so a
//! malformed upload is reported next to the others instead of aborting the batch. When nothing
//! could be extracted at all the analysis service is never called.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::builder::{ReportBuilder, ReportOutput};
use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::extract::{self, RegulationText};
use crate::fonts::{FontRegistry, ProcessFontRegistry};

/// One uploaded regulation document.
#[derive(Clone, Debug)]
pub struct RegulationSource {
    name: String,
    bytes: Vec<u8>,
}

impl RegulationSource {
    /// Wraps the raw bytes of an uploaded document.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a document from disk, naming it after its file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| ReportError::io(path, err))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Display name of the document, usually its file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw document bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// The floor plan image handed to the analysis service.
#[derive(Clone, Debug)]
pub struct FloorPlan {
    file_name: String,
    bytes: Vec<u8>,
}

impl FloorPlan {
    /// Wraps an uploaded image.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// File name printed in the report.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A regulation document that could not be extracted.
#[derive(Debug)]
pub struct ExtractionFailure {
    /// Name of the failing document.
    pub name: String,
    /// Why extraction failed.
    pub error: ReportError,
}

/// Aggregated regulation text of one review run.
#[derive(Debug, Default)]
pub struct RegulationCorpus {
    text: String,
    documents: Vec<(String, RegulationText)>,
    failures: Vec<ExtractionFailure>,
}

impl RegulationCorpus {
    /// Combined text of all documents, separated by `---` lines.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether no text could be extracted from any document.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Successfully extracted documents, in upload order.
    pub fn documents(&self) -> &[(String, RegulationText)] {
        &self.documents
    }

    /// Documents that could not be parsed.
    pub fn failures(&self) -> &[ExtractionFailure] {
        &self.failures
    }
}

/// External service that reviews a floor plan against a regulation corpus.
pub trait AnalysisService {
    /// Returns free-form findings for `plan` given the regulation text `corpus`.
    fn analyze(&self, plan: &FloorPlan, corpus: &str) -> Result<String>;
}

/// An analysis produced ahead of time, e.g. read from a file.
#[derive(Clone, Debug)]
pub struct PrecomputedAnalysis {
    text: String,
}

impl PrecomputedAnalysis {
    /// Wraps an existing analysis text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Reads the analysis text from a UTF-8 file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| ReportError::io(path, err))?;
        Ok(Self::new(text))
    }
}

impl AnalysisService for PrecomputedAnalysis {
    fn analyze(&self, _plan: &FloorPlan, _corpus: &str) -> Result<String> {
        Ok(self.text.trim().to_owned())
    }
}

/// Result of [`ReportPipeline::review`].
#[derive(Debug)]
pub enum ReviewOutcome {
    /// No regulation text was available, so nothing was analysed.
    NoRegulationText(RegulationCorpus),
    /// The plan was analysed and the report rendered.
    Completed {
        /// The regulation text the analysis was based on.
        corpus: RegulationCorpus,
        /// Findings returned by the analysis service.
        analysis: String,
        /// The rendered report.
        report: ReportOutput,
    },
}

/// Wires extraction, analysis and report rendering together.
#[derive(Clone, Debug)]
pub struct ReportPipeline<R = ProcessFontRegistry> {
    builder: ReportBuilder<R>,
}

impl ReportPipeline<ProcessFontRegistry> {
    /// Creates a pipeline using the process-wide font registry.
    pub fn new(config: ReportConfig) -> Self {
        Self::with_builder(ReportBuilder::new(config))
    }
}

impl<R: FontRegistry> ReportPipeline<R> {
    /// Creates a pipeline around an existing report builder.
    pub fn with_builder(builder: ReportBuilder<R>) -> Self {
        Self { builder }
    }

    /// The report builder in use.
    pub fn builder(&self) -> &ReportBuilder<R> {
        &self.builder
    }

    /// Extracts every document and aggregates the results.
    ///
    /// Failing documents are recorded and skipped. The aggregate is capped at the configured
    /// character budget and never ends in whitespace, even when the cut lands on a separator.
    pub fn collect_regulations(&self, sources: &[RegulationSource]) -> RegulationCorpus {
        let max_chars = self.builder.config().max_chars();
        let mut corpus = RegulationCorpus::default();

        for source in sources {
            match extract::extract_regulation(source.bytes(), max_chars) {
                Ok(text) => corpus.documents.push((source.name().to_owned(), text)),
                Err(error) => {
                    warn!("Skipping regulation '{}': {}", source.name(), error);
                    corpus.failures.push(ExtractionFailure {
                        name: source.name().to_owned(),
                        error,
                    });
                }
            }
        }

        let texts: Vec<&str> = corpus
            .documents
            .iter()
            .map(|(_, text)| text.text())
            .collect();
        corpus.text = extract::truncate_chars(&extract::aggregate(&texts), max_chars)
            .trim_end()
            .to_owned();

        info!(
            "Collected {} characters from {} of {} regulation documents",
            corpus.text.chars().count(),
            corpus.documents.len(),
            sources.len()
        );
        corpus
    }

    /// Runs a complete review of `plan`.
    ///
    /// Returns [`ReviewOutcome::NoRegulationText`] without calling `service` when the regulation
    /// corpus is empty.
    pub fn review<S>(
        &self,
        service: &S,
        plan: &FloorPlan,
        sources: &[RegulationSource],
        generated_at: &str,
    ) -> Result<ReviewOutcome>
    where
        S: AnalysisService + ?Sized,
    {
        let corpus = self.collect_regulations(sources);
        if corpus.is_empty() {
            warn!("No regulation text could be extracted; skipping analysis");
            return Ok(ReviewOutcome::NoRegulationText(corpus));
        }

        let analysis = service.analyze(plan, corpus.text())?;
        let report = self
            .builder
            .build(&analysis, plan.file_name(), generated_at)?;

        Ok(ReviewOutcome::Completed {
            corpus,
            analysis,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontCache, FontResolver};
    use std::cell::Cell;

    struct CountingService {
        calls: Cell<usize>,
    }

    impl AnalysisService for CountingService {
        fn analyze(&self, _plan: &FloorPlan, _corpus: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok("unused".into())
        }
    }

    fn pipeline() -> ReportPipeline<FontCache> {
        ReportPipeline::with_builder(ReportBuilder::with_resolver(
            ReportConfig::new(),
            FontResolver::with_registry(Vec::new(), FontCache::new()),
        ))
    }

    #[test]
    fn malformed_documents_are_collected_as_failures() {
        let corpus = pipeline().collect_regulations(&[
            RegulationSource::new("a.pdf", b"nope".to_vec()),
            RegulationSource::new("b.pdf", b"also nope".to_vec()),
        ]);
        assert!(corpus.is_empty());
        assert_eq!(corpus.failures().len(), 2);
        assert_eq!(corpus.failures()[1].name, "b.pdf");
        assert!(matches!(
            corpus.failures()[0].error,
            ReportError::MalformedDocument { .. }
        ));
    }

    #[test]
    fn empty_corpus_never_reaches_the_service() {
        let service = CountingService {
            calls: Cell::new(0),
        };
        let outcome = pipeline()
            .review(
                &service,
                &FloorPlan::new("plan.png", Vec::new()),
                &[RegulationSource::new("broken.pdf", b"x".to_vec())],
                "2024-05-01 10:00:00",
            )
            .expect("review");
        assert!(matches!(outcome, ReviewOutcome::NoRegulationText(_)));
        assert_eq!(service.calls.get(), 0);
    }

    #[test]
    fn missing_regulation_file_is_an_io_error() {
        let err = RegulationSource::from_path("/__compliance_report_missing__.pdf").unwrap_err();
        assert!(matches!(err, ReportError::Io { .. }));
    }

    #[test]
    fn precomputed_analysis_is_trimmed() {
        let service = PrecomputedAnalysis::new("\n  findings \n");
        let plan = FloorPlan::new("plan.png", Vec::new());
        assert_eq!(service.analyze(&plan, "corpus").expect("analyze"), "findings");
    }
}

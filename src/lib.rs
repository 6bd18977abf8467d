//! Compliance report generation for building-code reviews.
//!
//! Regulation PDFs are reduced to plain text with [`extract`], a font able to display the
//! report's script is located with [`fonts::FontResolver`], and [`builder::ReportBuilder`] renders
//! the externally produced analysis into a paginated PDF. [`pipeline::ReportPipeline`] strings the
//! three together.

pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod pipeline;
pub mod reproducible;
pub mod richtext;

pub use builder::{ReportBuilder, ReportDocument, ReportOutput};
pub use config::{ReportConfig, ReportLabels};
pub use error::{ReportError, Result};
pub use fonts::{FontAsset, FontCandidate, FontRegistry, FontResolver};
pub use pipeline::{AnalysisService, ReportPipeline, ReviewOutcome};

//! Runtime configuration for the report pipeline.
//!
//! The defaults reproduce the behaviour the review tool ships with. A handful of environment
//! variables can override them without recompiling:
//!
//! - `COMPLIANCE_REPORT_MAX_CHARS`: character budget for extracted regulation text.
//! - `COMPLIANCE_REPORT_FONTS_DIR`: extra directory searched first for `NanumGothic.ttf`.
//! - `COMPLIANCE_REPORT_DEFAULT_FONTS_DIR`: directory holding the metric files of the default
//!   font family (see [`crate::fonts::default_font_family`]).

use std::env;
use std::path::{Path, PathBuf};

use log::warn;

use crate::fonts::FontCandidate;

/// Default character budget for the aggregated regulation corpus.
pub const DEFAULT_MAX_CHARS: usize = 500_000;

/// Default uniform page margin in millimetres.
pub const DEFAULT_MARGIN_MM: f64 = 20.0;

pub(crate) const MAX_CHARS_ENV: &str = "COMPLIANCE_REPORT_MAX_CHARS";
pub(crate) const FONTS_DIR_ENV: &str = "COMPLIANCE_REPORT_FONTS_DIR";
pub(crate) const DEFAULT_FONTS_DIR_ENV: &str = "COMPLIANCE_REPORT_DEFAULT_FONTS_DIR";

const KOREAN_FONT_NAME: &str = "NanumGothic";
const KOREAN_FONT_FILE: &str = "NanumGothic.ttf";
const WINDOWS_FONT_NAME: &str = "MalgunGothic";

/// Fixed text fragments printed around the analysis body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLabels {
    /// Document title, also stored in the PDF info dictionary.
    pub title: String,
    /// Prefix of the timestamp line.
    pub analyzed_at: String,
    /// Prefix of the source filename line.
    pub plan_file: String,
    /// Label printed above the analysis body.
    pub analysis: String,
}

impl ReportLabels {
    /// Labels used by the Korean-language deployment.
    pub fn korean() -> Self {
        Self {
            title: "건축 법규 검토 결과".into(),
            analyzed_at: "분석 일시".into(),
            plan_file: "도면 파일명".into(),
            analysis: "AI 분석 내용:".into(),
        }
    }
}

impl Default for ReportLabels {
    fn default() -> Self {
        Self {
            title: "Building Code Review Result".into(),
            analyzed_at: "Analyzed at".into(),
            plan_file: "Floor plan file".into(),
            analysis: "AI analysis:".into(),
        }
    }
}

/// Configuration consumed by the extractor, the font resolver and the report builder.
#[derive(Clone, Debug)]
pub struct ReportConfig {
    max_chars: usize,
    font_candidates: Vec<FontCandidate>,
    margin_mm: f64,
    labels: ReportLabels,
    reproducible: bool,
    page_numbers: bool,
    default_fonts_dir: Option<PathBuf>,
}

impl ReportConfig {
    /// Creates a configuration with the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default configuration and applies the environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(raw) = env_value(MAX_CHARS_ENV) {
            match raw.parse::<usize>() {
                Ok(value) if value > 0 => config.max_chars = value,
                _ => warn!(
                    "Ignoring {}={:?}; expected a positive integer",
                    MAX_CHARS_ENV, raw
                ),
            }
        }

        if let Some(dir) = env_value(DEFAULT_FONTS_DIR_ENV) {
            config.default_fonts_dir = Some(PathBuf::from(dir));
        }

        if let Some(dir) = env_value(FONTS_DIR_ENV) {
            config.font_candidates.insert(
                0,
                FontCandidate::new(KOREAN_FONT_NAME, Path::new(&dir).join(KOREAN_FONT_FILE)),
            );
        }

        config
    }

    /// Character budget applied to each extraction and to the aggregate corpus.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Ordered font candidates, highest priority first.
    pub fn font_candidates(&self) -> &[FontCandidate] {
        &self.font_candidates
    }

    /// Uniform page margin in millimetres.
    pub fn margin_mm(&self) -> f64 {
        self.margin_mm
    }

    /// Labels printed in the report.
    pub fn labels(&self) -> &ReportLabels {
        &self.labels
    }

    /// Whether rendered reports have their volatile metadata stripped.
    pub fn reproducible(&self) -> bool {
        self.reproducible
    }

    /// Whether page numbers are printed in the footer.
    pub fn page_numbers(&self) -> bool {
        self.page_numbers
    }

    /// Directory searched first for the metric files of the default font family.
    pub fn default_fonts_dir(&self) -> Option<&Path> {
        self.default_fonts_dir.as_deref()
    }

    /// Sets the character budget. Zero is clamped to one.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    /// Replaces the font candidate list.
    pub fn with_font_candidates<I>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = FontCandidate>,
    {
        self.font_candidates = candidates.into_iter().collect();
        self
    }

    /// Sets the uniform page margin.
    pub fn with_margin_mm(mut self, margin_mm: f64) -> Self {
        self.margin_mm = margin_mm;
        self
    }

    /// Sets the report labels.
    pub fn with_labels(mut self, labels: ReportLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Enables or disables metadata normalization of rendered reports.
    pub fn with_reproducible(mut self, reproducible: bool) -> Self {
        self.reproducible = reproducible;
        self
    }

    /// Enables or disables page numbers in the footer.
    pub fn with_page_numbers(mut self, page_numbers: bool) -> Self {
        self.page_numbers = page_numbers;
        self
    }

    /// Sets the directory holding the `LiberationSans-*.ttf` metric files.
    pub fn with_default_fonts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_fonts_dir = Some(dir.into());
        self
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            font_candidates: default_font_candidates(&application_base_dir()),
            margin_mm: DEFAULT_MARGIN_MM,
            labels: ReportLabels::default(),
            reproducible: false,
            page_numbers: false,
            default_fonts_dir: None,
        }
    }
}

/// Directory the bundled font lookups are relative to: the folder of the running executable,
/// or the current directory when that cannot be determined.
pub fn application_base_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Builds the standard candidate list relative to `base_dir`.
pub fn default_font_candidates(base_dir: &Path) -> Vec<FontCandidate> {
    vec![
        FontCandidate::new(
            KOREAN_FONT_NAME,
            base_dir.join("fonts").join(KOREAN_FONT_FILE),
        ),
        FontCandidate::new(KOREAN_FONT_NAME, base_dir.join(KOREAN_FONT_FILE)),
        FontCandidate::new(WINDOWS_FONT_NAME, "C:/Windows/Fonts/malgun.ttf"),
        FontCandidate::new(WINDOWS_FONT_NAME, "C:/Windows/Fonts/malgunbd.ttf"),
    ]
}

pub(crate) fn env_value(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_candidates_keep_bundled_fonts_first() {
        let candidates = default_font_candidates(Path::new("/opt/app"));
        let names: Vec<_> = candidates.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            ["NanumGothic", "NanumGothic", "MalgunGothic", "MalgunGothic"]
        );
        assert_eq!(
            candidates[0].path(),
            Path::new("/opt/app/fonts/NanumGothic.ttf")
        );
        assert_eq!(candidates[1].path(), Path::new("/opt/app/NanumGothic.ttf"));
    }

    #[test]
    fn max_chars_is_never_zero() {
        assert_eq!(ReportConfig::new().with_max_chars(0).max_chars(), 1);
        assert_eq!(ReportConfig::new().max_chars(), DEFAULT_MAX_CHARS);
    }
}

//! Report assembly on top of `genpdf`.
//!
//! [`ReportBuilder::compose`] turns the analysis text and its metadata into a [`ReportDocument`],
//! an ordered list of markup blocks in which every free-text field has been escaped.
//! [`ReportBuilder::build`] resolves the base font, lays the blocks out on A4 pages and returns
//! the finished PDF.

use std::borrow::Cow;

use genpdf::elements::{Break, Paragraph};
use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::Style;
use genpdf::{self, render, Alignment, Element, Margins, Mm, PageDecorator, PaperSize, Position};
use genpdf::{RenderResult, Size};
use log::{debug, info, warn};

use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::fonts::{self, FontAsset, FontRegistry, FontResolver, ProcessFontRegistry};
use crate::reproducible;
use crate::richtext::{self, Line};

/// File name offered for the downloaded report.
pub const REPORT_FILE_NAME: &str = "analysis_result.pdf";

/// MIME type of the rendered report.
pub const REPORT_MIME_TYPE: &str = "application/pdf";

const TITLE_FONT_SIZE: u8 = 18;
const BODY_FONT_SIZE: u8 = 10;
const BODY_LINE_SPACING: f64 = 1.6;
const FOOTER_FONT_SIZE: u8 = 8;
const FOOTER_HEIGHT_MM: f64 = 8.0;

fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

/// A unit of report content, in rendering order.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportBlock {
    /// Centered, bold heading. Holds markup.
    Title(String),
    /// Body text. Holds markup, `<br/>` separates lines.
    Paragraph(String),
    /// Vertical gap in millimetres.
    Spacer(f64),
}

/// Everything that goes into one rendered report.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportDocument {
    title: String,
    generated_at: String,
    source_filename: String,
    analysis: String,
    base_font: String,
    margin_mm: f64,
    blocks: Vec<ReportBlock>,
}

impl ReportDocument {
    /// Document title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Generation timestamp, as supplied by the caller.
    pub fn generated_at(&self) -> &str {
        &self.generated_at
    }

    /// Name of the analysed floor plan file.
    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    /// Analysis text, unescaped.
    pub fn analysis(&self) -> &str {
        &self.analysis
    }

    /// Logical name of the base font, or [`fonts::DEFAULT_FONT_NAME`].
    pub fn base_font(&self) -> &str {
        &self.base_font
    }

    /// Uniform page margin in millimetres.
    pub fn margin_mm(&self) -> f64 {
        self.margin_mm
    }

    /// Content blocks in rendering order.
    pub fn blocks(&self) -> &[ReportBlock] {
        &self.blocks
    }

    fn restrict_to_builtin_charset(&mut self) {
        let mut replaced = 0;
        for block in &mut self.blocks {
            if let ReportBlock::Title(markup) | ReportBlock::Paragraph(markup) = block {
                let printable = match fonts::to_builtin_charset(markup) {
                    Cow::Borrowed(_) => continue,
                    Cow::Owned(printable) => printable,
                };
                *markup = printable;
                replaced += 1;
            }
        }

        if replaced > 0 {
            warn!(
                "{} report blocks contain characters {} cannot display; they were replaced",
                replaced,
                fonts::DEFAULT_FONT_NAME
            );
        }
    }
}

/// A rendered report ready to be offered for download.
#[derive(Clone, Debug)]
pub struct ReportOutput {
    /// The PDF bytes.
    pub bytes: Vec<u8>,
    /// Suggested file name.
    pub file_name: &'static str,
    /// MIME type of `bytes`.
    pub mime_type: &'static str,
    /// The content that was rendered.
    pub document: ReportDocument,
}

/// Builds compliance review reports.
#[derive(Clone, Debug)]
pub struct ReportBuilder<R = ProcessFontRegistry> {
    config: ReportConfig,
    resolver: FontResolver<R>,
}

impl ReportBuilder<ProcessFontRegistry> {
    /// Creates a builder that resolves fonts through the process-wide registry.
    pub fn new(config: ReportConfig) -> Self {
        let resolver = FontResolver::from_config(&config);
        Self { config, resolver }
    }
}

impl<R: FontRegistry> ReportBuilder<R> {
    /// Creates a builder with a custom font resolver.
    pub fn with_resolver(config: ReportConfig, resolver: FontResolver<R>) -> Self {
        Self { config, resolver }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// The font resolver in use.
    pub fn resolver(&self) -> &FontResolver<R> {
        &self.resolver
    }

    /// Resolves the base font and renders the report.
    pub fn build(
        &self,
        analysis: &str,
        source_filename: &str,
        generated_at: &str,
    ) -> Result<ReportOutput> {
        let font = self.resolver.resolve();
        self.build_with_font(analysis, source_filename, generated_at, font.as_ref())
    }

    /// Renders the report with an explicitly chosen font, or the default family for `None`.
    ///
    /// The default family only covers WinAnsiEncoding, so with `None` the composed blocks are
    /// passed through [`fonts::to_builtin_charset`] and unsupported characters print as `?`.
    pub fn build_with_font(
        &self,
        analysis: &str,
        source_filename: &str,
        generated_at: &str,
        font: Option<&FontAsset>,
    ) -> Result<ReportOutput> {
        let family = match font {
            Some(asset) => self.resolver.font_family(asset)?,
            None => fonts::default_font_family(self.config.default_fonts_dir())?,
        };

        let mut document = self.compose(analysis, source_filename, generated_at, font);
        if font.is_none() {
            document.restrict_to_builtin_charset();
        }
        let mut bytes = render_document(&document, family, &self.config)?;

        if self.config.reproducible() {
            bytes = reproducible::normalize(&bytes)?;
        }

        info!(
            "Rendered report for '{}' with font '{}' ({} bytes)",
            document.source_filename(),
            document.base_font(),
            bytes.len()
        );

        Ok(ReportOutput {
            bytes,
            file_name: REPORT_FILE_NAME,
            mime_type: REPORT_MIME_TYPE,
            document,
        })
    }

    /// Lays out the report content without rendering it.
    pub fn compose(
        &self,
        analysis: &str,
        source_filename: &str,
        generated_at: &str,
        font: Option<&FontAsset>,
    ) -> ReportDocument {
        let labels = self.config.labels();
        let blocks = vec![
            ReportBlock::Title(richtext::escape(&labels.title)),
            ReportBlock::Spacer(6.0),
            ReportBlock::Paragraph(format!(
                "{}: {}",
                richtext::escape(&labels.analyzed_at),
                richtext::escape(generated_at)
            )),
            ReportBlock::Paragraph(format!(
                "{}: {}",
                richtext::escape(&labels.plan_file),
                richtext::escape(source_filename)
            )),
            ReportBlock::Spacer(4.0),
            ReportBlock::Paragraph(richtext::escape(&labels.analysis)),
            ReportBlock::Spacer(2.0),
            ReportBlock::Paragraph(richtext::newlines_to_breaks(&richtext::escape(analysis))),
        ];

        ReportDocument {
            title: labels.title.clone(),
            generated_at: generated_at.to_owned(),
            source_filename: source_filename.to_owned(),
            analysis: analysis.to_owned(),
            base_font: font
                .map(|asset| asset.name().to_owned())
                .unwrap_or_else(|| fonts::DEFAULT_FONT_NAME.to_owned()),
            margin_mm: self.config.margin_mm(),
            blocks,
        }
    }
}

fn render_document(
    report: &ReportDocument,
    family: FontFamily<FontData>,
    config: &ReportConfig,
) -> Result<Vec<u8>> {
    let mut document = genpdf::Document::new(family);
    document.set_title(report.title());
    document.set_paper_size(PaperSize::A4);
    document.set_font_size(BODY_FONT_SIZE);
    document.set_line_spacing(BODY_LINE_SPACING);
    if config.reproducible() {
        document.set_minimal_conformance();
    }
    document.set_page_decorator(ReportPageDecorator::new(
        Margins::all(mm_from_f64(report.margin_mm())),
        config.page_numbers(),
    ));

    for block in report.blocks() {
        match block {
            ReportBlock::Title(markup) => {
                let style = Style::new().bold().with_font_size(TITLE_FONT_SIZE);
                for line in parse_block(markup)? {
                    let mut paragraph = paragraph_from_line(&line);
                    paragraph.set_alignment(Alignment::Center);
                    document.push(paragraph.styled(style));
                }
            }
            ReportBlock::Paragraph(markup) => {
                for line in parse_block(markup)? {
                    if line.iter().all(|span| span.text().trim().is_empty()) {
                        document.push(Break::new(1));
                    } else {
                        document.push(paragraph_from_line(&line));
                    }
                }
            }
            ReportBlock::Spacer(height) => document.push(Spacer::new(mm_from_f64(*height))),
        }
    }

    let mut bytes = Vec::new();
    document.render(&mut bytes)?;
    debug!("genpdf produced {} bytes", bytes.len());
    Ok(bytes)
}

fn parse_block(markup: &str) -> Result<Vec<Line>> {
    richtext::parse_markup(markup)
        .map_err(|err| ReportError::rendering(format!("invalid report markup: {}", err)))
}

fn paragraph_from_line(line: &Line) -> Paragraph {
    let mut paragraph = Paragraph::default();
    for span in line {
        paragraph.push(span.to_styled_string());
    }
    paragraph
}

/// Fixed vertical gap.
struct Spacer {
    height: Mm,
}

impl Spacer {
    fn new(height: Mm) -> Self {
        Self { height }
    }
}

impl Element for Spacer {
    fn render(
        &mut self,
        _context: &genpdf::Context,
        area: render::Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, Error> {
        let available = area.size().height;
        let height = if self.height > available {
            available
        } else {
            self.height
        };

        let mut result = RenderResult::default();
        result.size = Size::new(0, height);
        Ok(result)
    }
}

/// Applies the page margins and, optionally, prints the page number at the bottom.
struct ReportPageDecorator {
    page: usize,
    margins: Margins,
    page_numbers: bool,
}

impl ReportPageDecorator {
    fn new(margins: Margins, page_numbers: bool) -> Self {
        Self {
            page: 0,
            margins,
            page_numbers,
        }
    }
}

impl PageDecorator for ReportPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'a>,
        style: Style,
    ) -> Result<render::Area<'a>, Error> {
        self.page += 1;
        area.add_margins(self.margins);

        if self.page_numbers {
            let footer_height = mm_from_f64(FOOTER_HEIGHT_MM);
            let available = area.size().height;
            if footer_height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer_height));
            let mut footer = Paragraph::new(self.page.to_string());
            footer.set_alignment(Alignment::Center);
            let footer_style = style.with_font_size(FOOTER_FONT_SIZE);
            let result = footer.render(context, footer_area, footer_style)?;
            if result.has_more {
                return Err(Error::new(
                    "Page number does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - footer_height);
        }

        Ok(area)
    }
}

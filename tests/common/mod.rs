//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

/// Builds an in-memory PDF with one page per entry. Empty entries produce pages without text.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("save fixture pdf");
    bytes
}

const METRIC_FONT_FILES: [&str; 4] = [
    "LiberationSans-Regular.ttf",
    "LiberationSans-Bold.ttf",
    "LiberationSans-Italic.ttf",
    "LiberationSans-BoldItalic.ttf",
];

const TRUETYPE_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation2/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:/Windows/Fonts/arial.ttf",
];

/// Any TrueType font installed on this machine.
pub fn system_truetype_font() -> Option<PathBuf> {
    let configured = std::env::var_os("COMPLIANCE_REPORT_DEFAULT_FONTS_DIR")
        .map(|dir| PathBuf::from(dir).join(METRIC_FONT_FILES[0]));
    configured
        .into_iter()
        .chain(TRUETYPE_FONTS.iter().map(PathBuf::from))
        .find(|path| path.is_file())
}

/// A temporary directory laid out like a Liberation Sans install, so the default font family can
/// be loaded even where those files are not installed.
pub struct MetricFonts {
    dir: TempDir,
    source: PathBuf,
}

impl MetricFonts {
    /// Copies a system TrueType font under every metric file name.
    pub fn stage() -> Option<Self> {
        let source = system_truetype_font()?;
        let dir = tempfile::tempdir().expect("create metric font dir");
        for file in METRIC_FONT_FILES {
            fs::copy(&source, dir.path().join(file)).expect("stage metric font");
        }
        Some(Self { dir, source })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The installed font the metrics were copied from.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

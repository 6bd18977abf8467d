mod common;

use compliance_report::extract::{self, aggregate, join_pages, DOCUMENT_SEPARATOR};
use compliance_report::fonts::{FontCache, FontResolver};
use compliance_report::pipeline::{RegulationSource, ReportPipeline};
use compliance_report::{ReportBuilder, ReportConfig, ReportError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use common::pdf_with_pages;

#[test]
fn extracts_single_page_document() {
    let text = extract::extract(&pdf_with_pages(&["Rule 1"]), 500_000).expect("extract");
    assert_eq!(text, "Rule 1");
}

#[test]
fn pages_without_text_are_skipped() {
    let pdf = pdf_with_pages(&["", "Article 3", "", "", "Article 4"]);
    let regulation = extract::extract_regulation(&pdf, 500_000).expect("extract");
    assert_eq!(regulation.pages().len(), 2);
    assert_eq!(regulation.text(), "Article 3\n\nArticle 4");
}

#[test]
fn document_without_text_is_empty() {
    let text = extract::extract(&pdf_with_pages(&["", ""]), 500_000).expect("extract");
    assert!(text.is_empty());
}

#[test]
fn extraction_honours_the_budget() {
    let text = extract::extract(&pdf_with_pages(&["Minimum width 2.4m"]), 7).expect("extract");
    assert_eq!(text, "Minimum");
}

#[test]
fn non_pdf_input_is_malformed() {
    let err = extract::extract(b"PK\x03\x04 zip archive", 500_000).unwrap_err();
    assert!(matches!(err, ReportError::MalformedDocument { .. }));
}

#[test]
fn two_documents_aggregate_with_one_separator() {
    let first = extract::extract(&pdf_with_pages(&["Rule 1"]), 500_000).expect("first");
    let second = extract::extract(&pdf_with_pages(&["", "Rule 2"]), 500_000).expect("second");
    assert_eq!(second, "Rule 2");

    let corpus = aggregate(&[first, second]);
    assert_eq!(corpus, "Rule 1\n\n---\n\nRule 2");
    assert_eq!(corpus.matches(DOCUMENT_SEPARATOR).count(), 1);
    assert_eq!(corpus.trim(), corpus);
}

fn pipeline_with_budget(max_chars: usize) -> ReportPipeline<FontCache> {
    ReportPipeline::with_builder(ReportBuilder::with_resolver(
        ReportConfig::new().with_max_chars(max_chars),
        FontResolver::with_registry(Vec::new(), FontCache::new()),
    ))
}

#[test]
fn budget_cut_inside_the_separator_leaves_no_trailing_whitespace() {
    let corpus = pipeline_with_budget(8).collect_regulations(&[
        RegulationSource::new("a.pdf", pdf_with_pages(&["Rule 1"])),
        RegulationSource::new("b.pdf", pdf_with_pages(&["Rule 2"])),
    ]);
    assert_eq!(corpus.text(), "Rule 1");
}

#[test]
fn budget_cut_after_the_dashes_keeps_them() {
    let corpus = pipeline_with_budget(11).collect_regulations(&[
        RegulationSource::new("a.pdf", pdf_with_pages(&["Rule 1"])),
        RegulationSource::new("b.pdf", pdf_with_pages(&["Rule 2"])),
    ]);
    assert_eq!(corpus.text(), "Rule 1\n\n---");
}

fn page_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[ \t\n]{1,4}",
        "[ \n]{0,2}[a-z]{1,8}( [a-z]{1,8}){0,3}[ \n]{0,2}",
    ]
}

proptest! {
    #[test]
    fn joined_pages_form_one_block_per_text_page(pages in prop::collection::vec(page_strategy(), 0..12)) {
        let joined = join_pages(&pages, usize::MAX);
        let expected = pages.iter().filter(|page| !page.trim().is_empty()).count();

        if expected == 0 {
            prop_assert!(joined.is_empty());
        } else {
            let blocks: Vec<_> = joined.split("\n\n").collect();
            prop_assert_eq!(blocks.len(), expected);
            prop_assert!(blocks.iter().all(|block| !block.trim().is_empty()));
        }
    }

    #[test]
    fn truncation_yields_an_exact_prefix(
        pages in prop::collection::vec("\\PC{0,40}", 0..6),
        max_chars in 1usize..80,
    ) {
        let full = join_pages(&pages, usize::MAX);
        let capped = join_pages(&pages, max_chars);

        prop_assert!(full.starts_with(&capped));
        if full.chars().count() > max_chars {
            prop_assert_eq!(capped.chars().count(), max_chars);
        } else {
            prop_assert_eq!(&capped, &full);
        }
    }
}

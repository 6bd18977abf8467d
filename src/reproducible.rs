//! Removal of volatile metadata from rendered reports.
//!
//! The renderer stamps every PDF with the wall-clock time and a random document identifier, so two
//! renders of the same report differ byte-for-byte. [`normalize`] re-opens the rendered bytes with
//! `lopdf`, pins the info dictionary dates, drops the trailer `/ID` and the XMP metadata stream,
//! and serializes the document again.

use lopdf::{Document, Object, ObjectId};

use crate::error::{ReportError, Result};

/// Date written to `/CreationDate` and `/ModDate` of normalized documents.
pub const FIXED_PDF_DATE: &str = "D:20000101000000Z";

const VOLATILE_INFO_KEYS: &[&[u8]] = &[b"CreationDate", b"ModDate"];

/// Returns `pdf_bytes` with every time- or randomness-dependent field replaced or removed.
pub fn normalize(pdf_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut document = Document::load_mem(pdf_bytes).map_err(|err| {
        ReportError::rendering(format!("cannot re-open rendered PDF for normalization: {}", err))
    })?;

    document.trailer.remove(b"ID");
    pin_info_dates(&mut document);
    drop_catalog_metadata(&mut document);

    let mut buffer = Vec::new();
    document.save_to(&mut buffer).map_err(|err| {
        ReportError::rendering(format!("cannot serialize normalized PDF: {}", err))
    })?;
    Ok(buffer)
}

fn trailer_reference(document: &Document, key: &[u8]) -> Option<ObjectId> {
    document
        .trailer
        .get(key)
        .and_then(Object::as_reference)
        .ok()
}

fn pin_info_dates(document: &mut Document) {
    let Some(info_id) = trailer_reference(document, b"Info") else {
        return;
    };
    let Some(info) = document
        .objects
        .get_mut(&info_id)
        .and_then(|object| object.as_dict_mut().ok())
    else {
        return;
    };

    for key in VOLATILE_INFO_KEYS {
        if info.has(key) {
            info.set(*key, Object::string_literal(FIXED_PDF_DATE));
        }
    }
}

fn drop_catalog_metadata(document: &mut Document) {
    let Some(catalog_id) = trailer_reference(document, b"Root") else {
        return;
    };
    let removed = document
        .objects
        .get_mut(&catalog_id)
        .and_then(|object| object.as_dict_mut().ok())
        .and_then(|catalog| catalog.remove(b"Metadata"));

    if let Some(Object::Reference(metadata_id)) = removed {
        document.objects.remove(&metadata_id);
    }
}

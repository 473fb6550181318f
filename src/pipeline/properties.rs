//! Protocol parameters carried inside the PDF itself.
//!
//! The writer and the scanner must agree on resolution, layout, and whether
//! page 1 is a metadata page. Rather than leaving that to convention, the
//! writer stamps them into the trailer `Info` dictionary under `QrVault*`
//! keys, and the scanner reads them back before touching any page.
//!
//! pdfium can create pages but not custom Info entries, so the stamp is a
//! post-processing pass with lopdf over the bytes pdfium saved.

use crate::error::QrVaultError;
use crate::output::DocumentInfo;
use crate::pipeline::layout::LayoutPolicy;
use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Version of the property set written by this crate.
pub const PROPERTIES_VERSION: i64 = 1;

const KEY_VERSION: &str = "QrVaultVersion";
const KEY_DPI: &str = "QrVaultDpi";
const KEY_LAYOUT: &str = "QrVaultLayout";
const KEY_ROWS: &str = "QrVaultRows";
const KEY_CHUNKS: &str = "QrVaultChunks";
const KEY_CHUNK_SIZE: &str = "QrVaultChunkSize";
const KEY_METADATA_PAGE: &str = "QrVaultMetadataPage";
const KEY_INDEXED: &str = "QrVaultIndexed";

/// Everything the scanner needs to know about how a document was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProperties {
    pub dpi: u32,
    pub layout: LayoutPolicy,
    pub chunk_count: usize,
    pub chunk_size: usize,
    /// Page 1 holds statistics and instructions, not data.
    pub metadata_page: bool,
    /// Symbols start with a fixed-width index prefix.
    pub indexed: bool,
}

impl DocumentProperties {
    /// Return `pdf` with the properties written into its Info dictionary.
    pub fn stamp(&self, pdf: &[u8]) -> Result<Vec<u8>, QrVaultError> {
        let write_err = |e: lopdf::Error| QrVaultError::DocumentWriteFailed(format!("lopdf: {e}"));

        let mut doc = Document::load_mem(pdf).map_err(write_err)?;
        let info_id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
            Ok(id) => id,
            Err(_) => {
                let id = doc.add_object(Dictionary::new());
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };
        let info = doc
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(write_err)?;

        info.set(KEY_VERSION, Object::Integer(PROPERTIES_VERSION));
        info.set(KEY_DPI, Object::Integer(self.dpi as i64));
        info.set(KEY_LAYOUT, Object::string_literal(self.layout.name()));
        info.set(KEY_ROWS, Object::Integer(self.layout.slots_per_page() as i64));
        info.set(KEY_CHUNKS, Object::Integer(self.chunk_count as i64));
        info.set(KEY_CHUNK_SIZE, Object::Integer(self.chunk_size as i64));
        info.set(KEY_METADATA_PAGE, Object::Boolean(self.metadata_page));
        info.set(KEY_INDEXED, Object::Boolean(self.indexed));

        let mut out = Vec::with_capacity(pdf.len() + 512);
        doc.save_to(&mut out)
            .map_err(|e| QrVaultError::DocumentWriteFailed(format!("saving stamped PDF: {e}")))?;
        debug!("Stamped protocol properties: {:?}", self);
        Ok(out)
    }

    /// Read the properties back. `Ok(None)` means the PDF was not written by
    /// this crate (for example a scan of a printout).
    pub fn read(path: &Path, pdf: &[u8]) -> Result<Option<Self>, QrVaultError> {
        Self::from_document(path, &load(path, pdf)?)
    }

    fn from_document(path: &Path, doc: &Document) -> Result<Option<Self>, QrVaultError> {
        let Ok(info) = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
        else {
            return Ok(None);
        };
        if info.get(KEY_VERSION.as_bytes()).is_err() {
            return Ok(None);
        }

        let corrupt = |key: &str| QrVaultError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("document property {key} is missing or malformed"),
        };
        let int = |key: &str| -> Result<i64, QrVaultError> {
            info.get(key.as_bytes())
                .and_then(Object::as_i64)
                .ok()
                .filter(|v| *v >= 0)
                .ok_or_else(|| corrupt(key))
        };
        let flag = |key: &str| -> Result<bool, QrVaultError> {
            info.get(key.as_bytes())
                .and_then(Object::as_bool)
                .map_err(|_| corrupt(key))
        };

        let layout_name = info
            .get(KEY_LAYOUT.as_bytes())
            .and_then(Object::as_str)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .map_err(|_| corrupt(KEY_LAYOUT))?;
        let layout = LayoutPolicy::from_parts(&layout_name, int(KEY_ROWS)? as usize)
            .ok_or_else(|| corrupt(KEY_LAYOUT))?;

        Ok(Some(Self {
            dpi: int(KEY_DPI)? as u32,
            layout,
            chunk_count: int(KEY_CHUNKS)? as usize,
            chunk_size: int(KEY_CHUNK_SIZE)? as usize,
            metadata_page: flag(KEY_METADATA_PAGE)?,
            indexed: flag(KEY_INDEXED)?,
        }))
    }
}

/// Page count, PDF version and properties, from one parse of `pdf`.
pub fn inspect(path: &Path, pdf: &[u8]) -> Result<DocumentInfo, QrVaultError> {
    let doc = load(path, pdf)?;
    Ok(DocumentInfo {
        page_count: doc.get_pages().len(),
        pdf_version: doc.version.clone(),
        properties: DocumentProperties::from_document(path, &doc)?,
    })
}

fn load(path: &Path, pdf: &[u8]) -> Result<Document, QrVaultError> {
    Document::load_mem(pdf).map_err(|e| QrVaultError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

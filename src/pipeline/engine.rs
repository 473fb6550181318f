//! pdfium library binding.
//!
//! Lookup order: `PDFIUM_LIB_PATH` (a path to the library file), the
//! platform library name in the working directory, then the system library
//! search path. A missing library is reported as
//! [`QrVaultError::PdfiumBindingFailed`] instead of the panic
//! `Pdfium::default()` would raise.

use crate::error::QrVaultError;
use pdfium_render::prelude::*;
use tracing::debug;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library.
pub fn bind() -> Result<Pdfium, QrVaultError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => {
            debug!("Binding pdfium from {}={}", PDFIUM_LIB_PATH_ENV, path);
            Pdfium::bind_to_library(&path)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| QrVaultError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

//! Built-in format validators.
//!
//! Each submodule describes one carvable format: the signatures it is
//! registered under and the validation routine that walks a candidate's
//! structure to compute its exact byte length. Validators read strictly
//! forward through a [`CarveReader`](crate::reader::CarveReader) and treat
//! every structural problem, including truncation, as a recoverable
//! rejection.

mod au;
mod bmp;
mod gif;
mod jpeg;
mod mp3;
mod pcx;
mod pdf;
mod png;
mod rar;
mod sqlite;
mod tiff;
mod wav;
mod wma;
mod zip;

use crate::error::{CoreError, Result};
use crate::types::{FileHeader, FileScanner};
use std::sync::Arc;

pub use zip::MAX_ZIP_ENTRY_SIZE;

/// Every built-in format, in registry declaration order. The order is
/// observable: when several signatures match at one offset, the first
/// acceptance wins.
pub static FILE_HEADERS: &[FileHeader] = &[
    // audio formats
    mp3::MP3,
    wav::WAV,
    au::AU,
    wma::WMA,
    // image formats
    jpeg::JPEG,
    png::PNG,
    bmp::BMP,
    gif::GIF,
    pcx::PCX,
    tiff::TIFF,
    // archives and documents
    zip::ZIP,
    rar::RAR,
    pdf::PDF,
    sqlite::SQLITE,
];

/// Resolve a list of extensions to their headers; an empty list selects all
/// built-ins. Unknown extensions are a configuration error.
pub fn headers_for(exts: &[String]) -> Result<Vec<&'static FileHeader>> {
    if exts.is_empty() {
        return Ok(FILE_HEADERS.iter().collect());
    }
    exts.iter()
        .map(|ext| {
            FILE_HEADERS
                .iter()
                .find(|hdr| hdr.ext == ext)
                .ok_or_else(|| {
                    CoreError::InvalidConfig(format!("unknown file extension: {ext:?}"))
                })
        })
        .collect()
}

/// The built-in headers as registrable scanners.
pub fn builtin_scanners(exts: &[String]) -> Result<Vec<Arc<dyn FileScanner>>> {
    Ok(headers_for(exts)?
        .into_iter()
        .map(|hdr| Arc::new(*hdr) as Arc<dyn FileScanner>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_for_all() {
        let all = headers_for(&[]).unwrap();
        assert_eq!(all.len(), FILE_HEADERS.len());
    }

    #[test]
    fn test_headers_for_selection() {
        let selected = headers_for(&["png".into(), "zip".into()]).unwrap();
        let exts: Vec<&str> = selected.iter().map(|h| h.ext).collect();
        assert_eq!(exts, vec!["png", "zip"]);
    }

    #[test]
    fn test_unknown_extension_is_config_error() {
        let err = headers_for(&["midi".into()]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_signatures_are_non_empty() {
        for hdr in FILE_HEADERS {
            assert!(!hdr.signatures.is_empty(), "{} has no signatures", hdr.ext);
            for sig in hdr.signatures {
                assert!(!sig.is_empty(), "{} has an empty signature", hdr.ext);
            }
        }
    }
}

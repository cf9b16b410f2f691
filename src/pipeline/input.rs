//! Input resolution: turn a path, URL or byte buffer into an [`UploadedDocument`].
//!
//! ## Why keep bytes in memory?
//!
//! Uploads arrive as byte buffers, office files are converted over HTTP
//! from bytes to bytes, and pdfium can parse straight from a slice. Holding
//! the document in memory means no temp files to clean up and one code path
//! for every origin.
//!
//! The media type decides routing: `application/pdf` is parsed directly,
//! office formats go through the converter, anything else is rejected.

use crate::error::DocQuestError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// MIME type of PDF documents.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Office formats accepted for conversion, keyed by file extension.
pub const OFFICE_MEDIA_TYPES: &[(&str, &str)] = &[
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("doc", "application/msword"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("xls", "application/vnd.ms-excel"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("rtf", "application/rtf"),
];

/// A document as uploaded: original name, declared media type, raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl UploadedDocument {
    /// Wrap an in-memory upload. The media type is guessed from `name`
    /// when not given.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: Option<&str>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let name = name.into();
        let media_type = match media_type {
            Some(mt) => normalise_media_type(mt),
            None => media_type_for(&name).to_string(),
        };
        Self {
            name,
            media_type,
            bytes: bytes.into(),
        }
    }

    /// Read a local file. The upload name is the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DocQuestError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => DocQuestError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DocQuestError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, None, bytes))
    }

    /// Download a document over HTTP(S).
    ///
    /// The media type comes from the `Content-Type` header when it names a
    /// supported format, otherwise from the URL's file name.
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, DocQuestError> {
        info!("Downloading document from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DocQuestError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DocQuestError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                DocQuestError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(DocQuestError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let name = filename_from_url(url);
        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(normalise_media_type)
            .filter(|mt| is_supported(mt));

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DocQuestError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                DocQuestError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        info!("Downloaded {} ({} bytes)", name, bytes.len());
        Ok(Self::from_bytes(name, header_type.as_deref(), bytes.to_vec()))
    }

    /// True when the upload is already a PDF.
    pub fn is_pdf(&self) -> bool {
        self.media_type == PDF_MEDIA_TYPE
    }

    /// True when the upload needs conversion to PDF first.
    pub fn is_office(&self) -> bool {
        OFFICE_MEDIA_TYPES.iter().any(|(_, mt)| *mt == self.media_type)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI argument: URL inputs are downloaded, anything else is read
/// from disk.
pub async fn resolve(input: &str, timeout_secs: u64) -> Result<UploadedDocument, DocQuestError> {
    if is_url(input) {
        UploadedDocument::from_url(input, timeout_secs).await
    } else {
        UploadedDocument::from_path(PathBuf::from(input)).await
    }
}

/// Guess a media type from a file name's extension.
///
/// Unknown extensions map to `application/octet-stream`, which is rejected
/// as unsupported at ingestion time.
pub fn media_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "pdf" {
        return PDF_MEDIA_TYPE;
    }
    OFFICE_MEDIA_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mt)| *mt)
        .unwrap_or("application/octet-stream")
}

/// Validate the `%PDF` magic bytes.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), DocQuestError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        Ok(())
    } else {
        Err(DocQuestError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

fn is_supported(media_type: &str) -> bool {
    media_type == PDF_MEDIA_TYPE || OFFICE_MEDIA_TYPES.iter().any(|(_, mt)| *mt == media_type)
}

/// Drop parameters (`; charset=...`) and lowercase.
fn normalise_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Last URL path segment when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_media_type_guessing() {
        assert_eq!(media_type_for("Report.PDF"), PDF_MEDIA_TYPE);
        assert_eq!(media_type_for("deck.pptx"), OFFICE_MEDIA_TYPES[2].1);
        assert_eq!(media_type_for("notes.rtf"), "application/rtf");
        assert_eq!(media_type_for("photo.jpg"), "application/octet-stream");
        assert_eq!(media_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn test_routing_flags() {
        let pdf = UploadedDocument::from_bytes("a.pdf", None, b"%PDF-1.7".to_vec());
        assert!(pdf.is_pdf() && !pdf.is_office());
        let docx = UploadedDocument::from_bytes("a.docx", None, Vec::new());
        assert!(docx.is_office() && !docx.is_pdf());
        let declared =
            UploadedDocument::from_bytes("blob", Some("Application/PDF; charset=binary"), Vec::new());
        assert!(declared.is_pdf());
    }

    #[test]
    fn test_pdf_magic() {
        assert!(check_pdf_magic("a.pdf", b"%PDF-1.4\n...").is_ok());
        match check_pdf_magic("a.pdf", b"PK\x03\x04rest") {
            Err(DocQuestError::NotAPdf { magic, .. }) => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(check_pdf_magic("a.pdf", b"%P").is_err());
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.io/files/q3.pptx?dl=1"), "q3.pptx");
        assert_eq!(filename_from_url("https://x.io/download/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-1.5 body").unwrap();
        let doc = UploadedDocument::from_path(file.path()).await.unwrap();
        assert!(doc.is_pdf());
        assert!(doc.name.ends_with(".pdf"));
        assert_eq!(doc.bytes, b"%PDF-1.5 body");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = UploadedDocument::from_path("/definitely/not/here.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQuestError::FileNotFound { .. }));
    }
}

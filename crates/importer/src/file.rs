//! Lead file selection and validation.

use std::path::Path;

use crate::error::ImportError;

/// A lead file chosen for import, held in memory until submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LeadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, refusing anything over `max_bytes` before
    /// loading it.
    pub async fn from_path(path: &Path, max_bytes: u64) -> Result<Self, ImportError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = tokio::fs::metadata(path).await?.len();
        validate_file(&name, size, max_bytes)?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { name, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Check the extension, emptiness and size cap of a candidate file.
pub fn validate_file(name: &str, size: u64, max_bytes: u64) -> Result<(), ImportError> {
    let is_csv = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(ImportError::UnsupportedFile {
            name: name.to_string(),
        });
    }
    if size == 0 {
        return Err(ImportError::EmptyFile);
    }
    if size > max_bytes {
        return Err(ImportError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// Column names from the header row, offered for field mapping.
///
/// Handles quoted headers and a UTF-8 byte order mark. Rows after the
/// first are not inspected.
pub fn detect_columns(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let Some(header) = text.lines().next() else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = header.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => columns.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    columns.push(current.trim().to_string());
    columns.retain(|c| !c.is_empty());
    columns
}

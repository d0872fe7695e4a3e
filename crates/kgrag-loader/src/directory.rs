use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use kgrag_core::document::{Document, DocumentLoader, DocumentMetadata};
use kgrag_core::error::{KgError, Result};

pub const DEFAULT_DATA_DIR: &str = "data/";

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Leading bytes scanned for NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8192;

/// How a file's bytes become document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Text,
    Binary,
}

impl FileKind {
    fn detect(extension: Option<&str>, bytes: &[u8]) -> Self {
        if extension == Some("pdf") || bytes.starts_with(PDF_MAGIC) {
            return FileKind::Pdf;
        }
        let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if head.contains(&0) {
            FileKind::Binary
        } else {
            FileKind::Text
        }
    }
}

async fn extract_pdf_text(bytes: Vec<u8>) -> std::result::Result<String, String> {
    // pdf-extract can panic on malformed input; the join error carries it.
    match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("extractor aborted: {e}")),
    }
}

/// Reads every regular file of a directory into a [`Document`].
///
/// Hidden files and directories are skipped. Files are visited in sorted path
/// order so repeated runs produce the same sequence. PDFs contribute their
/// extracted text; other binary files, and PDFs with no readable text layer,
/// are skipped with a warning.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
    recursive: bool,
    extensions: Vec<String>,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            recursive: false,
            extensions: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Only load files with one of these extensions (without the dot, any case).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_hidden(entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }

    fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        Self::extension_of(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    fn collect_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Err(KgError::Load(format!(
                "Directory {} does not exist.",
                self.dir.display()
            )));
        }
        if !self.dir.is_dir() {
            return Err(KgError::Load(format!(
                "{} is not a directory.",
                self.dir.display()
            )));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e));

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                KgError::Load(format!("failed to list {}: {e}", self.dir.display()))
            })?;
            if entry.file_type().is_file() && self.wants(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    async fn read_document(path: &Path) -> Result<Option<Document>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| KgError::Load(format!("failed to read {}: {e}", path.display())))?;
        let fs_meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| KgError::Load(format!("failed to stat {}: {e}", path.display())))?;

        let file_type = Self::extension_of(path);
        let content = match FileKind::detect(file_type.as_deref(), &bytes) {
            FileKind::Text => String::from_utf8_lossy(&bytes).into_owned(),
            FileKind::Pdf => match extract_pdf_text(bytes).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    warn!(file = %path.display(), "PDF has no extractable text, skipping");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to extract PDF text, skipping");
                    return Ok(None);
                }
            },
            FileKind::Binary => {
                warn!(file = %path.display(), "Unsupported binary file, skipping");
                return Ok(None);
            }
        };

        let metadata = DocumentMetadata {
            file_path: path.display().to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_type,
            file_size: fs_meta.len(),
            last_modified_date: fs_meta.modified().ok().map(DateTime::<Utc>::from),
        };

        Ok(Some(Document::new(content, metadata)))
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    fn source(&self) -> String {
        self.dir.display().to_string()
    }

    async fn load(&self) -> Result<Vec<Document>> {
        let paths = self.collect_paths()?;
        debug!(dir = %self.dir.display(), files = paths.len(), "Listed document files");

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            let Some(document) = Self::read_document(path).await? else {
                continue;
            };
            debug!(
                file = %document.metadata.file_path,
                bytes = document.metadata.file_size,
                "Loaded document"
            );
            documents.push(document);
        }

        info!(
            dir = %self.dir.display(),
            documents = documents.len(),
            recursive = self.recursive,
            "Document load complete"
        );
        Ok(documents)
    }
}

//! Scratch files for uploads.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

/// An uploaded file's bytes on disk for the duration of one ingestion run.
///
/// Each scratch file gets a generated unique name inside the scratch
/// directory, so concurrent uploads with the same filename never share a
/// path. The file is deleted when the value is dropped, on every exit path.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Write `bytes` to a new uniquely named file in `dir`.
    ///
    /// The original filename's extension is kept so extension-sniffing loaders
    /// behave the same as on the original upload.
    pub fn create(dir: &Path, original_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let suffix = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut file =
            tempfile::Builder::new().prefix("upload-").suffix(&suffix).tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, logging instead of failing if removal does not succeed.
    pub fn release(self) {
        let path: PathBuf = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!(path = %path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

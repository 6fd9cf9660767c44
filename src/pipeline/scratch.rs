//! Per-invocation scratch area and the artifacts created inside it.
//!
//! Every invocation owns one [`ScratchArea`] (a private temp directory) and
//! creates at most three [`ScratchFile`]s in it: the raw download, the
//! normalized image and the assembled PDF. A `ScratchFile` is a guard: the
//! stage that is done with it calls [`ScratchFile::release`], and if an
//! early return skips that call, `Drop` deletes the file instead. Closing the
//! area afterwards removes anything left over.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// The three artifacts an invocation materialises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchKind {
    Raw,
    Normalized,
    Document,
}

impl ScratchKind {
    fn prefix(self) -> &'static str {
        match self {
            ScratchKind::Raw => "raw",
            ScratchKind::Normalized => "normalized",
            ScratchKind::Document => "document",
        }
    }
}

/// Private temp directory owned by one invocation.
#[derive(Debug)]
pub struct ScratchArea {
    dir: TempDir,
}

impl ScratchArea {
    /// Create a fresh directory under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scan2pdf-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Scratch area at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve a file for `kind`, named after `name`.
    ///
    /// The file itself is created by whoever writes to the returned path.
    pub fn file(&self, kind: ScratchKind, name: &str) -> ScratchFile {
        let sanitized: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '\0' { '_' } else { c })
            .collect();
        ScratchFile {
            path: self
                .dir
                .path()
                .join(format!("{}-{}", kind.prefix(), sanitized)),
            kind,
            released: false,
        }
    }

    /// Remove the directory and anything still in it.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// One scratch artifact. Deleted on [`release`](Self::release) or drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    kind: ScratchKind,
    released: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ScratchKind {
        self.kind
    }

    /// Delete the file now. Best effort: a missing file is fine, other
    /// failures are logged and otherwise ignored.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Deleted scratch file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete scratch file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.remove();
    }
}

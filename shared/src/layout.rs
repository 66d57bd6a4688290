/// Working-directory layout expected by htmc.
///
/// Every path is rooted at the server root: `bin/` holds the executable and
/// static library, `include/libhtmc/` the header, `tmp/` is scratch space
/// used by htmc itself, and the document root holds the `.htmc` sources.
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::LayoutError;

pub const BIN_DIR: &str = "bin";
pub const TMP_DIR: &str = "tmp";
pub const INCLUDE_DIR: &str = "include/libhtmc";
pub const EXEC_BASE_NAME: &str = "htmc";
pub const LIBRARY_NAME: &str = "libhtmc.a";
pub const HEADER_NAME: &str = "libhtmc.h";
pub const EXAMPLE_NAME: &str = "index.htmc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    doc_root: PathBuf,
}

impl Layout {
    /// Layout with the document root at the server root itself.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            doc_root: root.clone(),
            root,
        }
    }

    pub fn with_doc_root(mut self, doc_root: impl Into<PathBuf>) -> Self {
        self.doc_root = doc_root.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join(INCLUDE_DIR)
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Platform executable: `bin/htmc.exe` on Windows, `bin/htmc` elsewhere.
    pub fn exec_path(&self) -> PathBuf {
        self.bin_dir().join(exec_file_name())
    }

    pub fn library_path(&self) -> PathBuf {
        self.bin_dir().join(LIBRARY_NAME)
    }

    pub fn header_path(&self) -> PathBuf {
        self.include_dir().join(HEADER_NAME)
    }

    pub fn example_path(&self) -> PathBuf {
        self.doc_root.join(EXAMPLE_NAME)
    }

    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.bin_dir(),
            self.tmp_dir(),
            self.include_dir(),
            self.doc_root.clone(),
        ]
    }

    /// Resolve root and document root to absolute paths. Both must exist.
    pub fn canonicalize(&self) -> std::io::Result<Self> {
        Ok(Self {
            root: absolute(&self.root)?,
            doc_root: absolute(&self.doc_root)?,
        })
    }

    /// Create every required directory that is missing.
    ///
    /// Stops at the first directory that cannot be created.
    pub fn prepare(&self) -> Result<(), LayoutError> {
        for dir in self.required_dirs() {
            create_directory(&dir)?;
        }
        Ok(())
    }
}

pub fn exec_file_name() -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", EXEC_BASE_NAME)
    } else {
        EXEC_BASE_NAME.to_string()
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let resolved = path.canonicalize()?;
    // Strip Windows UNC prefix (\\?\) which breaks child process paths
    let display = resolved.display().to_string();
    Ok(match display.strip_prefix(r"\\?\") {
        Some(rest) => PathBuf::from(rest),
        None => resolved,
    })
}

fn create_directory(dir: &Path) -> Result<(), LayoutError> {
    if dir.is_dir() {
        debug!("Directory {} already exists", dir.display());
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }

    builder.create(dir).map_err(|source| LayoutError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    info!("Created directory {}", dir.display());
    Ok(())
}

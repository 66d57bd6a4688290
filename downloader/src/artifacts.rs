/// The files htmc-ws manages: where they live locally and where they come from.
use std::fmt;
use std::path::PathBuf;

use htmc_ws_shared::layout::{self, Layout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Executable,
    Library,
    Header,
    Example,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Executable => write!(f, "executable"),
            ArtifactKind::Library => write!(f, "library"),
            ArtifactKind::Header => write!(f, "header"),
            ArtifactKind::Example => write!(f, "example"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub url: String,
}

impl Artifact {
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// The three core artifacts plus the example page offered on first install.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub executable: Artifact,
    pub library: Artifact,
    pub header: Artifact,
    pub example: Artifact,
}

impl ArtifactSet {
    pub fn new(layout: &Layout, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            executable: Artifact {
                kind: ArtifactKind::Executable,
                path: layout.exec_path(),
                // the host publishes one `bin/htmc`, saved as `htmc.exe` on Windows
                url: format!("{}/{}/{}", base, layout::BIN_DIR, layout::EXEC_BASE_NAME),
            },
            library: Artifact {
                kind: ArtifactKind::Library,
                path: layout.library_path(),
                url: format!("{}/{}/{}", base, layout::BIN_DIR, layout::LIBRARY_NAME),
            },
            header: Artifact {
                kind: ArtifactKind::Header,
                path: layout.header_path(),
                url: format!("{}/{}/{}", base, layout::INCLUDE_DIR, layout::HEADER_NAME),
            },
            example: Artifact {
                kind: ArtifactKind::Example,
                path: layout.example_path(),
                url: format!("{}/examples/{}", base, layout::EXAMPLE_NAME),
            },
        }
    }

    /// Executable, library, and header: what the server needs to run.
    pub fn core(&self) -> [&Artifact; 3] {
        [&self.executable, &self.library, &self.header]
    }

    /// Everything a fresh install downloads.
    pub fn install_set(&self) -> [&Artifact; 4] {
        [&self.executable, &self.library, &self.header, &self.example]
    }

    pub fn missing(&self) -> Vec<&Artifact> {
        self.core().into_iter().filter(|a| !a.exists()).collect()
    }

    pub fn is_installed(&self) -> bool {
        self.missing().is_empty()
    }
}

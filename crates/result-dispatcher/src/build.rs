//! Build references and the on-disk build layout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File holding a build's test results, inside its build directory.
pub const RESULT_FILE_NAME: &str = "testResults.xml";

/// File holding a build's delivery audit trail, inside its build directory.
pub const AUDIT_FILE_NAME: &str = "testResultsAudit.json";

/// Identifies one build whose results are pending delivery.
///
/// Configurations of multi-configuration projects are referenced as
/// `"<parent>/<configuration>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReference {
    project_name: String,
    build_number: u64,
}

impl BuildReference {
    pub fn new(project_name: impl Into<String>, build_number: u64) -> Self {
        Self {
            project_name: project_name.into(),
            build_number,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn build_number(&self) -> u64 {
        self.build_number
    }

    /// Whether the project name maps to a build directory no other name
    /// maps to: non-empty `/`-separated segments, none of them `.` or `..`.
    pub fn has_canonical_project_name(&self) -> bool {
        self.project_name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
    }

    /// Top-level project name, used for relevance checks.
    pub fn root_project(&self) -> &str {
        self.project_name
            .split('/')
            .next()
            .unwrap_or(&self.project_name)
    }
}

impl fmt::Display for BuildReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project_name, self.build_number)
    }
}

impl<S: Into<String>> From<(S, u64)> for BuildReference {
    fn from((project_name, build_number): (S, u64)) -> Self {
        Self::new(project_name, build_number)
    }
}

/// Resolves a build reference to the file that gets uploaded.
pub trait ResultFileResolver: Send + Sync {
    fn result_file(&self, reference: &BuildReference) -> PathBuf;
}

/// Directory layout of build artifacts:
/// `<root>/<project segments...>/builds/<number>/`.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    root: PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one build. `.` and `..` segments of the project name are
    /// dropped so a reference can never escape the root; the pending queue
    /// refuses such names, so distinct queued builds never share a directory.
    pub fn build_dir(&self, reference: &BuildReference) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in reference
            .project_name()
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        {
            dir.push(segment);
        }
        dir.push("builds");
        dir.push(reference.build_number().to_string());
        dir
    }

    pub fn audit_file(&self, reference: &BuildReference) -> PathBuf {
        self.build_dir(reference).join(AUDIT_FILE_NAME)
    }
}

impl ResultFileResolver for BuildLayout {
    fn result_file(&self, reference: &BuildReference) -> PathBuf {
        self.build_dir(reference).join(RESULT_FILE_NAME)
    }
}

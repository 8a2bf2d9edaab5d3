//! REST API routes
//!
//! Maps object kinds and identifiers onto the service's URL layout:
//!
//! | Operation | Path |
//! |-----------|------|
//! | register upload | `/<collection>/` |
//! | register chunk | `/<collection>/<id>/<singular>chunk/` |
//! | upload chunk bytes | `/<collection>/<id>/<singular>chunk/<chunk_id>/chunk/` |
//! | finish upload | `/<collection>/<id>/finish_upload/` |
//! | download | `/<collection>/<id>/download/` |

use reqwest::Url;
use std::fmt;
use thiserror::Error;

/// Route building errors
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid base URL '{0}': {1}")]
    InvalidBaseUrl(String, String),

    #[error("Invalid path segment: {0}")]
    InvalidSegment(String),
}

/// Kind of object that can be uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Source code package, child of a project
    Package,
    /// Output file of a run
    RunArtifact,
    /// Final job output of a run
    RunResult,
}

impl TargetKind {
    /// Collection path segment (`packages`, `artifacts`, `results`)
    pub fn collection(&self) -> &'static str {
        match self {
            TargetKind::Package => "packages",
            TargetKind::RunArtifact => "artifacts",
            TargetKind::RunResult => "results",
        }
    }

    /// Singular name used in the chunk sub-resource (`packagechunk`, ...)
    pub fn singular(&self) -> &'static str {
        match self {
            TargetKind::Package => "package",
            TargetKind::RunArtifact => "artifact",
            TargetKind::RunResult => "result",
        }
    }

    /// Name of the parent identifier field in the register payload
    pub fn parent_field(&self) -> &'static str {
        match self {
            TargetKind::Package => "project_suuid",
            TargetKind::RunArtifact | TargetKind::RunResult => "run_suuid",
        }
    }

    /// Capitalized label used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Package => "Package",
            TargetKind::RunArtifact => "Artifact",
            TargetKind::RunResult => "Result",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of object that can be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Package,
    Artifact,
    Result,
    /// Run payload / manifest
    Run,
}

impl ResourceKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Package => "packages",
            ResourceKind::Artifact => "artifacts",
            ResourceKind::Result => "results",
            ResourceKind::Run => "runs",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Package => "Package",
            ResourceKind::Artifact => "Artifact",
            ResourceKind::Result => "Result",
            ResourceKind::Run => "Run",
        }
    }
}

impl From<TargetKind> for ResourceKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Package => ResourceKind::Package,
            TargetKind::RunArtifact => ResourceKind::Artifact,
            TargetKind::RunResult => ResourceKind::Result,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Addressable identity of a server-side object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectReference {
    pub suuid: String,
    pub kind: ResourceKind,
}

impl RemoteObjectReference {
    pub fn new(kind: ResourceKind, suuid: impl Into<String>) -> Self {
        Self {
            suuid: suuid.into(),
            kind,
        }
    }
}

impl fmt::Display for RemoteObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SUUID '{}'", self.kind.label(), self.suuid)
    }
}

/// URL builder rooted at the configured API base
#[derive(Debug, Clone)]
pub struct Routes {
    base: Url,
}

impl Routes {
    /// Create routes for a base URL such as `https://host/api/v1`
    pub fn new(base_url: &str) -> Result<Self, RouteError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| RouteError::InvalidBaseUrl(base_url.to_string(), e.to_string()))?;
        Ok(Self { base })
    }

    /// The normalized base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `/<collection>/`
    pub fn collection(&self, kind: TargetKind) -> Result<Url, RouteError> {
        self.join(&[kind.collection()])
    }

    /// `/<collection>/<id>/`
    pub fn object(&self, kind: TargetKind, id: &str) -> Result<Url, RouteError> {
        self.join(&[kind.collection(), id])
    }

    /// `/<collection>/<id>/<singular>chunk/`
    pub fn chunks(&self, kind: TargetKind, id: &str) -> Result<Url, RouteError> {
        let segment = format!("{}chunk", kind.singular());
        self.join(&[kind.collection(), id, &segment])
    }

    /// `/<collection>/<id>/<singular>chunk/<chunk_id>/chunk/`
    pub fn chunk_upload(&self, kind: TargetKind, id: &str, chunk_id: &str) -> Result<Url, RouteError> {
        let segment = format!("{}chunk", kind.singular());
        self.join(&[kind.collection(), id, &segment, chunk_id, "chunk"])
    }

    /// `/<collection>/<id>/finish_upload/`
    pub fn finish_upload(&self, kind: TargetKind, id: &str) -> Result<Url, RouteError> {
        self.join(&[kind.collection(), id, "finish_upload"])
    }

    /// `/<collection>/<id>/download/`
    pub fn download(&self, resource: &RemoteObjectReference) -> Result<Url, RouteError> {
        self.join(&[resource.kind.collection(), &resource.suuid, "download"])
    }

    /// `/projects/<suuid>/`, the push target of a package upload
    pub fn project(&self, suuid: &str) -> Result<Url, RouteError> {
        self.join(&["projects", suuid])
    }

    fn join(&self, segments: &[&str]) -> Result<Url, RouteError> {
        let mut path = String::new();
        for segment in segments {
            if segment.is_empty() || segment.contains('/') || segment.contains('?') {
                return Err(RouteError::InvalidSegment(segment.to_string()));
            }
            path.push_str(segment);
            path.push('/');
        }
        self.base
            .join(&path)
            .map_err(|e| RouteError::InvalidSegment(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Routes {
        Routes::new("https://api.example.com/api/v1").unwrap()
    }

    #[test]
    fn test_base_gets_trailing_slash() {
        assert_eq!(routes().base().as_str(), "https://api.example.com/api/v1/");
    }

    #[test]
    fn test_collection_paths() {
        let routes = routes();
        assert_eq!(
            routes.collection(TargetKind::Package).unwrap().path(),
            "/api/v1/packages/"
        );
        assert_eq!(
            routes.collection(TargetKind::RunArtifact).unwrap().path(),
            "/api/v1/artifacts/"
        );
        assert_eq!(
            routes.collection(TargetKind::RunResult).unwrap().path(),
            "/api/v1/results/"
        );
    }

    #[test]
    fn test_chunk_paths() {
        let routes = routes();
        assert_eq!(
            routes.chunks(TargetKind::Package, "pkg1").unwrap().path(),
            "/api/v1/packages/pkg1/packagechunk/"
        );
        assert_eq!(
            routes
                .chunk_upload(TargetKind::RunArtifact, "art1", "c-1")
                .unwrap()
                .path(),
            "/api/v1/artifacts/art1/artifactchunk/c-1/chunk/"
        );
        assert_eq!(
            routes.finish_upload(TargetKind::RunResult, "r1").unwrap().path(),
            "/api/v1/results/r1/finish_upload/"
        );
    }

    #[test]
    fn test_download_path() {
        let resource = RemoteObjectReference::new(ResourceKind::Run, "run42");
        assert_eq!(
            routes().download(&resource).unwrap().path(),
            "/api/v1/runs/run42/download/"
        );
    }

    #[test]
    fn test_rejects_segment_with_slash() {
        assert!(routes().object(TargetKind::Package, "../etc").is_err());
        assert!(routes().object(TargetKind::Package, "").is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(Routes::new("not a url").is_err());
    }

    #[test]
    fn test_reference_display() {
        let resource = RemoteObjectReference::new(ResourceKind::Package, "abc");
        assert_eq!(resource.to_string(), "Package SUUID 'abc'");
    }
}

//! Command handlers
//!
//! Each handler prints a one-line result (stdout on success, stderr on
//! failure) and maps it onto an [`ExitStatus`].

use super::{ArtifactCommand, Command, ExitStatus, PackageCommand, ResultCommand, RunCommand};
use crate::auth::{self, Credentials};
use crate::cache::PushTargetCache;
use crate::config::Config;
use crate::download::RangedDownloader;
use crate::routes::{RemoteObjectReference, ResourceKind, Routes};
use crate::transport::{HttpTransport, TransportConfig};
use crate::upload::{SourceFile, UploadEngine, UploadOutcome, UploadTarget};
use anyhow::Context as _;
use std::path::{Path, PathBuf};

/// Components shared by the transfer commands
pub struct Context {
    pub config: Config,
    pub routes: Routes,
    pub transport: HttpTransport,
}

impl Context {
    /// Build routes and an authenticated transport from `config`
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let token = auth::resolve_token(
            config.api.token.as_deref(),
            &config.auth.credentials_path,
        )?;
        if token.is_none() {
            tracing::warn!("No API token configured; requests are sent unauthenticated");
        }
        let routes = Routes::new(&config.api.base_url)?;
        let transport = HttpTransport::new(TransportConfig::from_api(&config.api, token))?;
        Ok(Self {
            config,
            routes,
            transport,
        })
    }

    fn upload_engine(&self) -> UploadEngine {
        UploadEngine::new(
            self.transport.clone(),
            self.routes.clone(),
            self.config.upload.clone(),
        )
    }

    fn downloader(&self) -> RangedDownloader {
        RangedDownloader::new(self.transport.clone(), self.routes.clone())
    }
}

/// Run one command
pub async fn execute(command: Command, config: Config) -> ExitStatus {
    let command = match command {
        Command::Login { token } => return login(token, &config),
        command => command,
    };

    let context = match Context::from_config(config) {
        Ok(context) => context,
        Err(e) => return fail(format!("{:#}", e)),
    };
    dispatch(&context, command).await
}

async fn dispatch(context: &Context, command: Command) -> ExitStatus {
    match command {
        Command::Login { .. } => fail("login does not need a transfer context".to_string()),
        Command::Package(PackageCommand::Upload {
            file,
            project,
            description,
            force,
        }) => upload_package(context, &file, &project, description, force).await,
        Command::Package(PackageCommand::Download(args)) => {
            download(context, ResourceKind::Package, &args.suuid, &args.output).await
        }
        Command::Artifact(ArtifactCommand::Upload { path, run, job }) => {
            upload_artifacts(context, &path, &run, &job).await
        }
        Command::Artifact(ArtifactCommand::Download(args)) => {
            download(context, ResourceKind::Artifact, &args.suuid, &args.output).await
        }
        Command::Result(ResultCommand::Upload {
            file,
            run,
            description,
        }) => upload_result(context, &file, &run, description).await,
        Command::Run(RunCommand::Download(args)) => {
            download(context, ResourceKind::Run, &args.suuid, &args.output).await
        }
    }
}

fn login(token: Option<String>, config: &Config) -> ExitStatus {
    let token = match token.filter(|t| !t.trim().is_empty()) {
        Some(token) => token.trim().to_string(),
        None => {
            let stdin = std::io::stdin();
            match auth::prompt_token(&mut stdin.lock(), &mut std::io::stderr()) {
                Ok(token) => token,
                Err(e) => return fail(e.to_string()),
            }
        }
    };

    let path = &config.auth.credentials_path;
    match (Credentials { token }).save(path) {
        Ok(()) => succeed(format!("Token stored in {}", path.display())),
        Err(e) => fail(e.to_string()),
    }
}

async fn upload_package(
    context: &Context,
    file: &Path,
    project: &str,
    description: Option<String>,
    force: bool,
) -> ExitStatus {
    if let Some(status) = require("project SUUID", project) {
        return status;
    }

    let push_target = match context.routes.project(project) {
        Ok(url) => url.to_string(),
        Err(e) => return fail(e.to_string()),
    };
    let mut cache = match PushTargetCache::load(&context.config.cache.path) {
        Ok(cache) => cache,
        Err(e) => return fail(e.to_string()),
    };

    if !force {
        if let Some(existing) = cache.get(&push_target) {
            return fail(format!(
                "Package {} is already registered for {}; pass --force to upload again",
                existing, push_target
            ));
        }
    }

    let mut target = UploadTarget::package(project);
    target.description = description;
    let outcome = match upload_file(context, file, None, &target).await {
        Ok(outcome) => outcome,
        Err(status) => return status,
    };

    if outcome.ok {
        if let Some(id) = &outcome.remote_object_id {
            cache.insert(push_target, id.clone());
            if let Err(e) = cache.save() {
                tracing::warn!(error = %e, "Could not update push-target cache");
            }
        }
    }
    report(outcome)
}

async fn upload_artifacts(context: &Context, path: &Path, run: &str, job: &str) -> ExitStatus {
    if let Some(status) = require("run SUUID", run).or_else(|| require("job name", job)) {
        return status;
    }

    let files = match collect_files(path) {
        Ok(files) => files,
        Err(e) => return fail(format!("{:#}", e)),
    };
    if files.is_empty() {
        return fail(format!("No files to upload in '{}'", path.display()));
    }

    let target = UploadTarget::artifact(run, job);
    for (file, name) in &files {
        let outcome = match upload_file(context, file, Some(name.clone()), &target).await {
            Ok(outcome) => outcome,
            Err(status) => return status,
        };
        let status = report(outcome);
        if status != ExitStatus::Success {
            return status;
        }
    }
    ExitStatus::Success
}

async fn upload_result(
    context: &Context,
    file: &Path,
    run: &str,
    description: Option<String>,
) -> ExitStatus {
    if let Some(status) = require("run SUUID", run) {
        return status;
    }

    let mut target = UploadTarget::result(run);
    target.description = description;
    match upload_file(context, file, None, &target).await {
        Ok(outcome) => report(outcome),
        Err(status) => status,
    }
}

async fn download(
    context: &Context,
    kind: ResourceKind,
    suuid: &str,
    output: &Path,
) -> ExitStatus {
    if let Some(status) = require("SUUID", suuid) {
        return status;
    }

    let resource = RemoteObjectReference::new(kind, suuid);
    let outcome = context.downloader().fetch_to_path(&resource, output).await;
    if outcome.ok {
        succeed(outcome.message)
    } else {
        fail(outcome.message)
    }
}

async fn upload_file(
    context: &Context,
    file: &Path,
    name: Option<String>,
    target: &UploadTarget,
) -> Result<UploadOutcome, ExitStatus> {
    let source = SourceFile::open(file).await.map_err(|e| fail(e.to_string()))?;
    let source = match name {
        Some(name) => source.with_filename(name),
        None => source,
    };
    Ok(context.upload_engine().upload(source, target).await)
}

/// Regular files under `path` with their `/`-separated names relative to it
///
/// A single file yields just its file name. Directories are walked
/// recursively and returned in sorted order.
fn collect_files(path: &Path) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot access '{}'", path.display()))?;

    if metadata.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        return Ok(vec![(path.to_path_buf(), name)]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("Cannot read directory '{}'", dir.display()))?;
            let file_type = entry.file_type()?;
            let entry_path = entry.path();
            if file_type.is_dir() {
                pending.push(entry_path);
            } else if file_type.is_file() {
                let relative = entry_path
                    .strip_prefix(path)
                    .unwrap_or(&entry_path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((entry_path, relative));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn require(what: &str, value: &str) -> Option<ExitStatus> {
    if value.trim().is_empty() {
        eprintln!("error: {} must not be empty", what);
        Some(ExitStatus::Usage)
    } else {
        None
    }
}

fn report(outcome: UploadOutcome) -> ExitStatus {
    if outcome.ok {
        succeed(outcome.message)
    } else {
        fail(outcome.message)
    }
}

fn succeed(message: String) -> ExitStatus {
    println!("{}", message);
    ExitStatus::Success
}

fn fail(message: String) -> ExitStatus {
    eprintln!("{}", message);
    ExitStatus::Failure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.bin");
        std::fs::write(&file, b"weights").unwrap();

        let files = collect_files(&file).unwrap();
        assert_eq!(files, vec![(file, "model.bin".to_string())]);
    }

    #[test]
    fn test_collect_directory_sorted_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("logs/epoch1")).unwrap();
        std::fs::write(dir.path().join("summary.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("logs/train.log"), b"a").unwrap();
        std::fs::write(dir.path().join("logs/epoch1/metrics.csv"), b"b").unwrap();

        let names: Vec<_> = collect_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(
            names,
            vec!["logs/epoch1/metrics.csv", "logs/train.log", "summary.json"]
        );
    }

    #[test]
    fn test_collect_missing_path() {
        assert!(collect_files(Path::new("/nonexistent/runpilot/output")).is_err());
    }

    #[test]
    fn test_require_rejects_blank() {
        assert_eq!(require("run SUUID", "  "), Some(ExitStatus::Usage));
        assert_eq!(require("run SUUID", "run1"), None);
    }
}

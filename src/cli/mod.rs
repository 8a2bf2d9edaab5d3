//! Command-line interface
//!
//! Commands are a closed set of `clap` subcommands resolved at parse time.
//! Identifier and path arguments fall back to the job environment
//! (`RUN_SUUID`, `JOB_NAME`, `PACKAGE_SUUID`, `PROJECT_SUUID`, `OUTPUT_PATH`),
//! so a missing value is a usage error reported by `clap` with exit code 2.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

pub use commands::{execute, Context};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Transport, business or local I/O failure
    Failure,
    /// Missing or invalid arguments
    Usage,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Usage => 2,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

/// Runpilot - client for projects, jobs and runs
#[derive(Parser, Debug)]
#[command(name = "runpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "RUNPILOT_CONFIG", default_value = "runpilot.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Write transfer metrics in Prometheus text format to this file on exit
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store an API token for later commands
    Login {
        /// Token to store; prompted for when omitted
        #[arg(long)]
        token: Option<String>,
    },

    /// Source code packages
    #[command(subcommand)]
    Package(PackageCommand),

    /// Run artifacts
    #[command(subcommand)]
    Artifact(ArtifactCommand),

    /// Run results
    #[command(subcommand)]
    Result(ResultCommand),

    /// Runs
    #[command(subcommand)]
    Run(RunCommand),
}

#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    /// Upload a packaged source archive to a project
    Upload {
        /// Package file
        file: PathBuf,

        /// Project SUUID
        #[arg(long, env = "PROJECT_SUUID")]
        project: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,

        /// Upload even if this project already has a registered package
        #[arg(long)]
        force: bool,
    },

    /// Download a package
    Download(PackageDownload),
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    /// Upload a file, or every file under a directory, as run artifacts
    Upload {
        /// File or directory to upload
        #[arg(env = "OUTPUT_PATH")]
        path: PathBuf,

        /// Run SUUID
        #[arg(long, env = "RUN_SUUID")]
        run: String,

        /// Name of the job producing the artifacts
        #[arg(long, env = "JOB_NAME")]
        job: String,
    },

    /// Download an artifact
    Download(ArtifactDownload),
}

#[derive(Subcommand, Debug)]
pub enum ResultCommand {
    /// Upload the final output of a run
    Upload {
        /// Result file
        file: PathBuf,

        /// Run SUUID
        #[arg(long, env = "RUN_SUUID")]
        run: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Download the payload of a run
    Download(RunDownload),
}

/// Package download arguments
#[derive(Args, Debug)]
pub struct PackageDownload {
    /// Package SUUID
    #[arg(env = "PACKAGE_SUUID")]
    pub suuid: String,

    /// Destination file or directory
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: PathBuf,
}

/// Artifact download arguments
#[derive(Args, Debug)]
pub struct ArtifactDownload {
    /// Artifact SUUID
    pub suuid: String,

    /// Destination file or directory
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: PathBuf,
}

/// Run payload download arguments
#[derive(Args, Debug)]
pub struct RunDownload {
    /// Run SUUID
    #[arg(env = "RUN_SUUID")]
    pub suuid: String,

    /// Destination file or directory
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_package_upload() {
        let cli = Cli::try_parse_from([
            "runpilot",
            "package",
            "upload",
            "code.zip",
            "--project",
            "proj1",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Command::Package(PackageCommand::Upload {
                file,
                project,
                force,
                description,
            }) => {
                assert_eq!(file, PathBuf::from("code.zip"));
                assert_eq!(project, "proj1");
                assert!(force);
                assert!(description.is_none());
            }
            other => panic!("Expected package upload, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_artifact_download() {
        let cli = Cli::try_parse_from([
            "runpilot", "artifact", "download", "art9", "--output", "out.bin",
        ])
        .unwrap();
        match cli.command {
            Command::Artifact(ArtifactCommand::Download(args)) => {
                assert_eq!(args.suuid, "art9");
                assert_eq!(args.output, PathBuf::from("out.bin"));
            }
            other => panic!("Expected artifact download, got {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert_eq!(ExitStatus::Usage.code(), 2);
    }
}

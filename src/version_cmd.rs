use crate::cli::VersionCommand;
use crate::reporter::{Reporter, TerminalReporter};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::version::Version;
use crate::version_file::ProjectFile;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

pub fn run(command: VersionCommand) -> Result<()> {
    let repo_root = std::env::current_dir().context("Failed to determine current directory.")?;
    if let Some(version) = run_with(
        &repo_root,
        &command,
        &mut ProcessRunner,
        &mut TerminalReporter,
    )? {
        println!("{version}");
    }
    Ok(())
}

/// Returns the version for `show`, nothing for the other commands.
pub(crate) fn run_with(
    repo_root: &Path,
    command: &VersionCommand,
    runner: &mut dyn CommandRunner,
    reporter: &mut dyn Reporter,
) -> Result<Option<Version>> {
    let project_file = ProjectFile::detect(repo_root)?;
    debug!(file = %project_file.relative_path().display(), "detected project file");

    match command {
        VersionCommand::Show => project_file.current_version(runner).map(Some),
        VersionCommand::Verify { version } => {
            let expected = match version.trim() {
                "current" => None,
                other => Some(Version::parse(other)?),
            };
            project_file.verify_version(runner, expected.as_ref(), reporter)?;
            Ok(None)
        }
        VersionCommand::Update {
            version,
            develop,
            force,
        } => {
            let new_version = Version::parse(version)?;
            let update =
                project_file.update_version(runner, &new_version, *develop, *force, reporter)?;
            if !update.is_noop() {
                debug!(
                    previous = ?update.previous,
                    new = %update.new,
                    files = ?update.changed_files,
                    "version updated"
                );
            }
            Ok(None)
        }
    }
}

use crate::changelog::{self, RepositoryLinks};
use crate::cli::ChangelogArgs;
use crate::config::{self, ChangelogConfig};
use crate::conventional;
use crate::git;
use crate::reporter::{Reporter, TerminalReporter};
use crate::runner::{CommandRunner, ProcessRunner};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChangelogOptions {
    pub project: Option<String>,
    pub space: String,
    pub tag_prefix: String,
    pub cc_config: Option<PathBuf>,
    pub current_version: Option<String>,
    pub next_version: Option<String>,
    pub output: String,
    pub today: NaiveDate,
}

pub fn run(args: ChangelogArgs) -> Result<()> {
    let repo_root = std::env::current_dir().context("Failed to determine current directory.")?;
    let options = ChangelogOptions {
        project: args.common.project,
        space: args.common.space,
        tag_prefix: args.common.git_tag_prefix,
        cc_config: args.cc_config,
        current_version: args.current_version,
        next_version: args.next_version,
        output: args.output,
        today: Local::now().date_naive(),
    };
    run_with(
        &repo_root,
        &options,
        &mut ProcessRunner,
        &mut TerminalReporter,
    )?;
    Ok(())
}

/// Writes `{changelog_dir}/{output}` and returns its repository-relative path.
pub(crate) fn run_with(
    repo_root: &Path,
    options: &ChangelogOptions,
    runner: &mut dyn CommandRunner,
    reporter: &mut dyn Reporter,
) -> Result<PathBuf> {
    let config = load_config(repo_root, options.cc_config.as_deref(), reporter)?;
    let project = git::resolve_project(runner, repo_root, options.project.as_deref())?;
    let links = RepositoryLinks::new(&options.space, &project);

    let markdown = generate(
        runner,
        repo_root,
        &config,
        &links,
        &options.tag_prefix,
        options.next_version.as_deref(),
        options.current_version.as_deref(),
        options.today,
    )?;

    let relative = Path::new(&config.changelog_dir).join(&options.output);
    write_changelog(repo_root, &relative, &markdown)?;
    reporter.ok(&format!("Created changelog {}", relative.display()));
    Ok(relative)
}

pub(crate) fn load_config(
    repo_root: &Path,
    explicit: Option<&Path>,
    reporter: &mut dyn Reporter,
) -> Result<ChangelogConfig> {
    let config = config::load(explicit, repo_root)?;
    debug!(source = ?config.source, "loaded commit type configuration");
    for warning in &config.warnings {
        reporter.warning(warning);
    }
    Ok(config)
}

/// Renders the commits since the last release tag. `current_version`
/// defaults to that tag.
#[allow(clippy::too_many_arguments)]
pub(crate) fn generate(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    config: &ChangelogConfig,
    links: &RepositoryLinks,
    tag_prefix: &str,
    next_version: Option<&str>,
    current_version: Option<&str>,
    today: NaiveDate,
) -> Result<String> {
    let last_tag = git::last_release_tag(runner, repo_root, tag_prefix)?;
    let log = git::log_oneline(runner, repo_root, last_tag.as_deref())?;
    let commits = conventional::parse_log(&log);
    let grouped = conventional::classify(&commits, &config.commit_types, &links.commit())?;

    Ok(changelog::render(
        &grouped,
        &config.commit_types,
        links,
        next_version,
        current_version.or(last_tag.as_deref()),
        today,
    ))
}

pub(crate) fn write_changelog(repo_root: &Path, relative: &Path, markdown: &str) -> Result<()> {
    let path = repo_root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create `{}`.", parent.display()))?;
    }
    fs::write(&path, markdown).with_context(|| format!("Failed to write `{}`.", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use crate::reporter::testing::{Level, RecordingReporter};
    use crate::runner::testing::{ScriptedRunner, ok};
    use tempfile::tempdir;

    fn options() -> ChangelogOptions {
        ChangelogOptions {
            project: Some("foo".to_string()),
            space: "greenbone".to_string(),
            tag_prefix: "v".to_string(),
            cc_config: None,
            current_version: None,
            next_version: Some("1.3.0".to_string()),
            output: "unreleased.md".to_string(),
            today: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        }
    }

    #[test]
    fn writes_changelog_for_commits_since_last_tag() {
        let temp_dir = tempdir().unwrap();
        let mut runner = ScriptedRunner::new(vec![
            ok("v1.1.0\nv1.2.0\nv1.2.0.dev1\n"),
            ok("abc1234 Add: shiny thing\ndef5678 chore: tidy\n0a0b0c0 Fix - crash\n"),
        ]);
        let mut reporter = RecordingReporter::default();

        let relative = run_with(temp_dir.path(), &options(), &mut runner, &mut reporter).unwrap();

        assert_eq!(relative, PathBuf::from("changelog/unreleased.md"));
        assert_eq!(runner.lines()[1], "git log --format=%h %s v1.2.0..HEAD");
        let written = fs::read_to_string(temp_dir.path().join(&relative)).unwrap();
        assert!(written.contains("## [1.3.0] - 2026-10-19\n"));
        assert!(written.contains(
            "* shiny thing [abc1234](https://github.com/greenbone/foo/commit/abc1234)"
        ));
        assert!(written.contains("### Bug Fixes\n* crash [0a0b0c0]"));
        assert!(!written.contains("tidy"));
        assert!(written.contains("[1.3.0]: https://github.com/greenbone/foo/compare/v1.2.0...1.3.0"));
        assert!(reporter.contains(Level::Ok, "Created changelog"));
    }

    #[test]
    fn fails_without_conventional_commits() {
        let temp_dir = tempdir().unwrap();
        let mut runner = ScriptedRunner::new(vec![ok(""), ok("abc1234 Merge branch x\n")]);
        let mut reporter = RecordingReporter::default();

        let err = run_with(temp_dir.path(), &options(), &mut runner, &mut reporter).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReleaseError>(),
            Some(&ReleaseError::NoConventionalCommits)
        );
        assert_eq!(runner.lines()[1], "git log --format=%h %s HEAD");
        assert!(!temp_dir.path().join("changelog").exists());
    }
}

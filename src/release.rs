use crate::changelog;
use crate::cli::ReleaseArgs;
use crate::error::ReleaseError;
use crate::forge::{Forge, GitHubClient, NewRelease};
use crate::git;
use crate::prepare::{RELEASE_NOTES_FILE, resolve_changelog_path};
use crate::reporter::{Reporter, TerminalReporter};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::version::{self, Version};
use crate::version_file::ProjectFile;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub project: Option<String>,
    pub space: String,
    pub tag_prefix: String,
    pub token_env: String,
    pub token: Option<String>,
    pub release_version: Option<Version>,
    pub next_version: Option<Version>,
    pub git_signing_key: Option<String>,
    pub git_remote_name: Option<String>,
    pub conventional_commits: bool,
    pub changelog: Option<PathBuf>,
    pub dry_run: bool,
}

impl ReleaseOptions {
    fn from_args(args: ReleaseArgs) -> Result<Self> {
        let token = std::env::var(&args.common.token_env).ok();
        Ok(Self {
            project: args.common.project,
            space: args.common.space,
            tag_prefix: args.common.git_tag_prefix,
            token_env: args.common.token_env,
            token,
            release_version: args
                .release_version
                .as_deref()
                .map(Version::parse)
                .transpose()?,
            next_version: args
                .next_version
                .as_deref()
                .map(Version::parse)
                .transpose()?,
            git_signing_key: args.git_signing_key,
            git_remote_name: args.git_remote_name,
            conventional_commits: args.conventional_commits,
            changelog: args.changelog,
            dry_run: args.dry_run,
        })
    }
}

pub fn run(args: ReleaseArgs) -> Result<()> {
    let repo_root = std::env::current_dir().context("Failed to determine current directory.")?;
    let options = ReleaseOptions::from_args(args)?;
    let project = git::resolve_project(&mut ProcessRunner, &repo_root, options.project.as_deref())?;
    let mut forge = GitHubClient::new(&options.space, &project, options.token.clone())?;
    let options = ReleaseOptions {
        project: Some(project),
        ..options
    };
    run_with(
        &repo_root,
        &options,
        &mut ProcessRunner,
        &mut forge,
        &mut TerminalReporter,
    )
}

/// The token named by `token_env`, if it is set to something non-blank.
pub(crate) fn require_token(token: Option<&str>, token_env: &str) -> Result<String> {
    match token.map(str::trim).filter(|token| !token.is_empty()) {
        Some(token) => Ok(token.to_string()),
        None => Err(ReleaseError::MissingToken(token_env.to_string()).into()),
    }
}

pub(crate) fn run_with(
    repo_root: &Path,
    options: &ReleaseOptions,
    runner: &mut dyn CommandRunner,
    forge: &mut dyn Forge,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    require_token(options.token.as_deref(), &options.token_env)?;

    let project = git::resolve_project(runner, repo_root, options.project.as_deref())?;
    let signing_key =
        git::resolve_signing_key(runner, repo_root, options.git_signing_key.as_deref(), reporter)?;
    let remote = options.git_remote_name.as_deref();

    let project_file = ProjectFile::detect(repo_root)?;
    let release_version = match options.release_version {
        Some(release_version) => release_version,
        None => project_file.current_version(runner)?,
    };
    let next_version = match options.next_version {
        Some(next_version) => next_version,
        None => version::next_dev_version(&release_version.to_string())?,
    };
    let tag = format!("{}{release_version}", options.tag_prefix);
    let release_name = format!("{project} {release_version}");

    if options.dry_run {
        reporter.info(&format!(
            "Would push and publish release `{release_name}` for tag {tag}."
        ));
        reporter.info(&format!(
            "Would continue development with version {}.",
            next_version.with_dev(1)
        ));
        return Ok(());
    }

    reporter.info("Pushing changes");
    git::push_follow_tags(runner, repo_root, remote)?;

    reporter.info(&format!("Creating release for {tag}"));
    let notes_path = repo_root.join(RELEASE_NOTES_FILE);
    let notes = fs::read_to_string(&notes_path).with_context(|| {
        format!(
            "Failed to read release notes `{}`. Run `relkit prepare` first.",
            notes_path.display()
        )
    })?;
    let created = forge.create_release(&NewRelease {
        tag_name: &tag,
        name: &release_name,
        body: &notes,
        draft: false,
        prerelease: false,
    })?;
    fs::remove_file(&notes_path)
        .with_context(|| format!("Failed to remove `{}`.", notes_path.display()))?;
    debug!(url = %created.html_url, name = ?created.name, "release created");
    reporter.ok(&format!("Created release {release_name}"));

    let mut commit_message =
        format!("Automatic adjustments after release\n\n* Update to version {next_version}\n");
    let mut changelog_file = None;
    if !options.conventional_commits {
        let changelog_path = resolve_changelog_path(repo_root, options.changelog.as_deref(), reporter);
        let full_path = repo_root.join(&changelog_path);
        let markdown = fs::read_to_string(&full_path)
            .with_context(|| format!("Failed to read changelog `{}`.", full_path.display()))?;
        let updated = changelog::append_skeleton(
            &markdown,
            &release_version.to_string(),
            &project,
            &options.tag_prefix,
            &options.space,
        );
        fs::write(&full_path, updated)
            .with_context(|| format!("Failed to write `{}`.", full_path.display()))?;
        changelog_file = Some(changelog_path);
        commit_message.push_str(&format!("* Add empty changelog after {release_version}"));
    }

    let update = project_file.update_version(runner, &next_version, true, false, reporter)?;
    let mut files_to_commit = update.changed_files;
    files_to_commit.extend(changelog_file);

    git::add_files(runner, repo_root, &files_to_commit)?;
    git::commit(runner, repo_root, &commit_message, &signing_key)?;
    git::push_follow_tags(runner, repo_root, remote)?;
    Ok(())
}

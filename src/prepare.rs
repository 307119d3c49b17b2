use crate::changelog::{self, RepositoryLinks, SectionMatcher};
use crate::changelog_cmd;
use crate::cli::PrepareArgs;
use crate::error::ReleaseError;
use crate::git;
use crate::reporter::{Reporter, TerminalReporter};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::version::{self, CalendarSlot, Version};
use crate::version_file::ProjectFile;
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use similar::TextDiff;
use std::fs;
use std::path::{Path, PathBuf};

pub const RELEASE_NOTES_FILE: &str = ".release.md";
pub const DEFAULT_CHANGELOG_FILE: &str = "CHANGELOG.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStrategy {
    Explicit(Version),
    Calendar,
    Patch,
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub project: Option<String>,
    pub space: String,
    pub tag_prefix: String,
    pub strategy: VersionStrategy,
    pub git_signing_key: Option<String>,
    pub conventional_commits: bool,
    pub cc_config: Option<PathBuf>,
    pub changelog: Option<PathBuf>,
    pub dry_run: bool,
    pub today: NaiveDate,
}

impl PrepareOptions {
    fn from_args(args: PrepareArgs, today: NaiveDate) -> Result<Self> {
        let strategy = match (
            args.version.release_version,
            args.version.calendar,
            args.version.patch,
        ) {
            (Some(raw), false, false) => VersionStrategy::Explicit(Version::parse(&raw)?),
            (None, true, false) => VersionStrategy::Calendar,
            (None, false, true) => VersionStrategy::Patch,
            _ => bail!("Pass exactly one of `--release-version`, `--calendar` or `--patch`."),
        };

        Ok(Self {
            project: args.common.project,
            space: args.common.space,
            tag_prefix: args.common.git_tag_prefix,
            strategy,
            git_signing_key: args.git_signing_key,
            conventional_commits: args.conventional_commits,
            cc_config: args.cc_config,
            changelog: args.changelog,
            dry_run: args.dry_run,
            today,
        })
    }
}

pub fn run(args: PrepareArgs) -> Result<()> {
    let repo_root = std::env::current_dir().context("Failed to determine current directory.")?;
    let options = PrepareOptions::from_args(args, Local::now().date_naive())?;
    run_with(
        &repo_root,
        &options,
        &mut ProcessRunner,
        &mut TerminalReporter,
    )
}

struct ChangelogPlan {
    path: PathBuf,
    before: String,
    after: String,
    notes: String,
}

pub(crate) fn run_with(
    repo_root: &Path,
    options: &PrepareOptions,
    runner: &mut dyn CommandRunner,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    let project = git::resolve_project(runner, repo_root, options.project.as_deref())?;
    let signing_key =
        git::resolve_signing_key(runner, repo_root, options.git_signing_key.as_deref(), reporter)?;

    let project_file = ProjectFile::detect(repo_root)?;
    reporter.ok(&format!(
        "Found {} project definition file.",
        project_file.kind().file_name()
    ));
    let release_version = match options.strategy {
        VersionStrategy::Explicit(release_version) => release_version,
        VersionStrategy::Calendar => version::calendar_version(
            &project_file.current_version(runner)?,
            CalendarSlot::from_date(options.today),
        )?,
        VersionStrategy::Patch => {
            version::next_patch_version(&project_file.current_version(runner)?)?
        }
    };
    reporter.info(&format!("Preparing the release {release_version}"));

    let tag = format!("{}{release_version}", options.tag_prefix);
    if git::list_tags(runner, repo_root)?.contains(&tag) {
        return Err(ReleaseError::TagCollision(tag).into());
    }

    let links = RepositoryLinks::new(&options.space, &project);
    let plan = if options.conventional_commits {
        plan_conventional_changelog(runner, repo_root, options, &links, &release_version, reporter)?
    } else {
        plan_manual_changelog(repo_root, options, &release_version, &tag, reporter)?
    };

    if options.dry_run {
        reporter.info(&format!(
            "Would update {} to {release_version}.",
            project_file.kind().file_name()
        ));
        reporter.info(&format!("Would create tag {tag}."));
        report_diff(reporter, &plan);
        return Ok(());
    }

    let update = project_file.update_version(runner, &release_version, false, false, reporter)?;
    let mut files_to_commit = update.changed_files;

    changelog_cmd::write_changelog(repo_root, &plan.path, &plan.after)?;
    if options.conventional_commits {
        reporter.ok(&format!("Created changelog {}", plan.path.display()));
        git::add_files(runner, repo_root, std::slice::from_ref(&plan.path))?;
        git::commit(
            runner,
            repo_root,
            &format!("Changelog created for release to {release_version}"),
            &signing_key,
        )?;
    } else {
        reporter.ok(&format!("Updated {}", plan.path.display()));
        files_to_commit.push(plan.path.clone());
    }

    reporter.info("Committing changes");
    let commit_message = format!("Automatic release to {release_version}");
    git::add_files(runner, repo_root, &files_to_commit)?;
    git::commit(runner, repo_root, &commit_message, &signing_key)?;
    git::create_tag(runner, repo_root, &tag, &commit_message, &signing_key)?;

    let notes_path = repo_root.join(RELEASE_NOTES_FILE);
    fs::write(&notes_path, &plan.notes)
        .with_context(|| format!("Failed to write `{}`.", notes_path.display()))?;
    reporter.warning(&format!(
        "Please verify git tag {tag}, commit and release text in {RELEASE_NOTES_FILE}"
    ));
    reporter.info("Afterwards please execute release");
    Ok(())
}

fn plan_conventional_changelog(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    options: &PrepareOptions,
    links: &RepositoryLinks,
    release_version: &Version,
    reporter: &mut dyn Reporter,
) -> Result<ChangelogPlan> {
    let config = changelog_cmd::load_config(repo_root, options.cc_config.as_deref(), reporter)?;
    let next_version = release_version.to_string();
    let rendered = changelog_cmd::generate(
        runner,
        repo_root,
        &config,
        links,
        &options.tag_prefix,
        Some(&next_version),
        None,
        options.today,
    )?;

    let path = Path::new(&config.changelog_dir).join(format!("v{next_version}.md"));
    let before = fs::read_to_string(repo_root.join(&path)).unwrap_or_default();
    Ok(ChangelogPlan {
        path,
        before,
        notes: changelog::strip_header(&rendered),
        after: rendered,
    })
}

fn plan_manual_changelog(
    repo_root: &Path,
    options: &PrepareOptions,
    release_version: &Version,
    tag: &str,
    reporter: &mut dyn Reporter,
) -> Result<ChangelogPlan> {
    let path = resolve_changelog_path(repo_root, options.changelog.as_deref(), reporter);
    let full_path = repo_root.join(&path);
    let markdown = fs::read_to_string(&full_path)
        .with_context(|| format!("Failed to read changelog `{}`.", full_path.display()))?;

    let version_text = release_version.to_string();
    let Some(updated) = changelog::locate_and_replace_unreleased(
        &markdown,
        &version_text,
        SectionMatcher::Version(&version_text),
        options.today,
    )
    .or_else(|| {
        changelog::locate_and_replace_unreleased(
            &markdown,
            &version_text,
            SectionMatcher::Unreleased,
            options.today,
        )
    }) else {
        return Err(ReleaseError::ChangelogSectionNotFound(path.display().to_string()).into());
    };

    Ok(ChangelogPlan {
        after: changelog::rewrite_unreleased_link(&updated.markdown, &version_text, tag),
        notes: changelog::rewrite_unreleased_link(&updated.release_notes, &version_text, tag),
        path,
        before: markdown,
    })
}

/// Repository-relative changelog path. An explicit path that is not a file
/// falls back to `CHANGELOG.md` with a warning.
pub(crate) fn resolve_changelog_path(
    repo_root: &Path,
    explicit: Option<&Path>,
    reporter: &mut dyn Reporter,
) -> PathBuf {
    let Some(explicit) = explicit else {
        return PathBuf::from(DEFAULT_CHANGELOG_FILE);
    };

    let candidate = repo_root.join(explicit);
    if candidate.is_file() {
        return explicit.to_path_buf();
    }
    reporter.warning(&format!("{} is not a file.", candidate.display()));
    PathBuf::from(DEFAULT_CHANGELOG_FILE)
}

fn report_diff(reporter: &mut dyn Reporter, plan: &ChangelogPlan) {
    let current = format!("a/{}", plan.path.display());
    let proposed = format!("b/{}", plan.path.display());
    let diff = TextDiff::from_lines(&plan.before, &plan.after);
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&current, &proposed)
        .to_string();

    if unified.trim().is_empty() {
        reporter.info("No changelog changes.");
    } else {
        reporter.info(&unified);
    }
}

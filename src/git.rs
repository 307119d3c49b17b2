use crate::error::ReleaseError;
use crate::reporter::Reporter;
use crate::runner::{CommandRunner, format_command, run_checked};
use crate::version::Version;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

fn git(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    args: &[&str],
    context: &str,
) -> Result<String> {
    let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
    let output = run_checked(runner, repo_root, "git", &args, &[], context)?;
    Ok(output.stdout)
}

pub fn list_tags(runner: &mut dyn CommandRunner, repo_root: &Path) -> Result<Vec<String>> {
    let stdout = git(runner, repo_root, &["tag", "--list"], "Failed to list git tags.")?;
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Highest tag of the form `{tag_prefix}{version}`.
pub fn last_release_tag(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    tag_prefix: &str,
) -> Result<Option<String>> {
    let tags = list_tags(runner, repo_root)?;
    Ok(highest_version_tag(&tags, tag_prefix))
}

pub fn highest_version_tag(tags: &[String], tag_prefix: &str) -> Option<String> {
    let mut latest: Option<(Version, &String)> = None;
    for tag in tags {
        let Some(raw_version) = tag.strip_prefix(tag_prefix) else {
            continue;
        };
        let Ok(version) = Version::parse(raw_version) else {
            continue;
        };

        let replace = match &latest {
            None => true,
            Some((current, _)) => version > *current,
        };
        if replace {
            latest = Some((version, tag));
        }
    }

    latest.map(|(_, tag)| tag.clone())
}

/// One `short-hash subject` line per commit, newest first.
pub fn log_oneline(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    since_tag: Option<&str>,
) -> Result<String> {
    let range = match since_tag {
        Some(tag) => format!("{tag}..HEAD"),
        None => "HEAD".to_string(),
    };
    git(
        runner,
        repo_root,
        &["log", "--format=%h %s", &range],
        "Failed to read commit history.",
    )
}

pub fn add_files(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    files: &[PathBuf],
) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }

    let mut args = vec!["add".to_string(), "--".to_string()];
    args.extend(files.iter().map(|path| path.to_string_lossy().to_string()));
    run_checked(runner, repo_root, "git", &args, &[], "Failed to stage release files.")?;
    Ok(())
}

pub fn commit(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    message: &str,
    signing_key: &str,
) -> Result<()> {
    let sign_flag = format!("-S{signing_key}");
    let mut args = vec!["commit"];
    if !signing_key.is_empty() {
        args.push(&sign_flag);
    }
    args.extend(["--no-verify", "-m", message]);
    git(runner, repo_root, &args, "Failed to commit release changes.")?;
    Ok(())
}

pub fn create_tag(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    tag: &str,
    message: &str,
    signing_key: &str,
) -> Result<()> {
    let mut args = vec!["tag"];
    if !signing_key.is_empty() {
        args.extend(["-u", signing_key]);
    }
    args.extend([tag, "-m", message]);
    git(runner, repo_root, &args, "Failed to create release tag.")?;
    Ok(())
}

pub fn push_follow_tags(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    remote: Option<&str>,
) -> Result<()> {
    let mut args = vec!["push", "--follow-tags"];
    if let Some(remote) = remote.filter(|remote| !remote.trim().is_empty()) {
        args.push(remote);
    }
    git(runner, repo_root, &args, "Failed to push release changes.")?;
    Ok(())
}

/// Repository name derived from the remote URL, e.g. `pontos` for
/// `git@github.com:greenbone/pontos.git`.
pub fn project_name(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    remote: &str,
) -> Result<String> {
    let stdout = git(
        runner,
        repo_root,
        &["remote", "get-url", remote],
        "Failed to determine the project name from the git remote.",
    )?;
    let name = project_name_from_url(&stdout);
    if name.is_empty() {
        bail!("Remote `{remote}` has no usable repository name. Pass `--project`.");
    }
    Ok(name)
}

/// `explicit` when given, otherwise the name of the `origin` remote.
pub fn resolve_project(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    explicit: Option<&str>,
) -> Result<String> {
    match explicit.map(str::trim).filter(|project| !project.is_empty()) {
        Some(project) => Ok(project.to_string()),
        None => project_name(runner, repo_root, "origin"),
    }
}

pub fn project_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).trim().to_string()
}

/// Configured `user.signingkey`, or an empty string when git has none.
pub fn signing_key(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    reporter: &mut dyn Reporter,
) -> Result<String> {
    let args = ["config".to_string(), "user.signingkey".to_string()];
    let output = runner.run(repo_root, "git", &args, &[])?;
    match output.status {
        0 => Ok(output.stdout.trim().to_string()),
        1 => {
            reporter.warning("No signing key found.");
            Ok(String::new())
        }
        code => Err(ReleaseError::CommandFailed {
            command: format_command("git", &args),
            status: code,
            stderr: output.stderr.trim().to_string(),
        })
        .context("Failed to look up the git signing key."),
    }
}

pub fn resolve_signing_key(
    runner: &mut dyn CommandRunner,
    repo_root: &Path,
    explicit: Option<&str>,
    reporter: &mut dyn Reporter,
) -> Result<String> {
    match explicit {
        Some(key) => Ok(key.trim().to_string()),
        None => signing_key(runner, repo_root, reporter),
    }
}

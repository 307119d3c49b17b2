use crate::cli::{FileStatus, FileStatusArgs, GithubCommand, PullRequestArgs};
use crate::forge::{GitHubClient, NewPullRequest, PullRequestForge};
use crate::release::require_token;
use crate::reporter::{Reporter, TerminalReporter};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tracing::debug;

pub type FilesByStatus = BTreeMap<FileStatus, Vec<String>>;

pub fn run(command: GithubCommand) -> Result<()> {
    let mut reporter = TerminalReporter;
    match command {
        GithubCommand::Pr(args) => {
            let mut forge = client(&args.repo, &args.token_env)?;
            create_pull_request(&args, &mut forge, &mut reporter)
        }
        GithubCommand::FileStatus(args) => {
            let mut forge = client(&args.repo, &args.token_env)?;
            let files = file_status(&args, &mut forge, &mut reporter)?;
            for (status, paths) in files {
                reporter.info(&format!("{}:", status.label()));
                for path in paths {
                    println!("{path}");
                }
            }
            Ok(())
        }
    }
}

fn client(repository: &str, token_env: &str) -> Result<GitHubClient> {
    let token = require_token(std::env::var(token_env).ok().as_deref(), token_env)?;
    GitHubClient::for_repository(repository, Some(token))
}

pub(crate) fn create_pull_request(
    args: &PullRequestArgs,
    forge: &mut dyn PullRequestForge,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    if !forge.branch_exists(&args.head)? {
        bail!(
            "Head branch {} is not existing or authorisation failed.",
            args.head
        );
    }
    reporter.ok(&format!("Head branch {} is existing.", args.head));

    if !forge.branch_exists(&args.target)? {
        bail!(
            "Target branch {} is not existing or authorisation failed.",
            args.target
        );
    }
    reporter.ok(&format!("Target branch {} is existing.", args.target));

    let body = args.body.replace("\\n", "\n");
    forge.create_pull_request(&NewPullRequest {
        head: &args.head,
        base: &args.target,
        title: &args.title,
        body: &body,
    })?;
    reporter.ok("Pull Request created.");
    Ok(())
}

/// Files of the pull request for each requested status. Every requested
/// status is present, even without files.
pub(crate) fn file_status(
    args: &FileStatusArgs,
    forge: &mut dyn PullRequestForge,
    reporter: &mut dyn Reporter,
) -> Result<FilesByStatus> {
    if !forge.pull_request_exists(args.pr_number)? {
        bail!(
            "PR {} is not existing or authorisation failed.",
            args.pr_number
        );
    }
    reporter.ok(&format!("PR {} is existing.", args.pr_number));

    let mut grouped: FilesByStatus = args
        .status
        .iter()
        .map(|status| (*status, Vec::new()))
        .collect();
    for file in forge.pull_request_files(args.pr_number)? {
        let Some(status) = FileStatus::from_api(&file.status) else {
            debug!(file = %file.filename, status = %file.status, "skipping file");
            continue;
        };
        if let Some(paths) = grouped.get_mut(&status) {
            paths.push(file.filename);
        }
    }
    Ok(grouped)
}

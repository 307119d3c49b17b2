use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "relkit",
    version,
    about = "release automation for forge-hosted projects"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bump the version, update the changelog, commit and tag a release.
    Prepare(PrepareArgs),
    /// Push a prepared release, publish it on GitHub and start the next cycle.
    Release(ReleaseArgs),
    /// Sign the release archives and assets and upload the signatures.
    Sign(SignArgs),
    /// Build a changelog from conventional commits.
    Changelog(ChangelogArgs),
    /// Show, verify or update the project version.
    #[command(subcommand)]
    Version(VersionCommand),
    /// Pull-request helpers for GitHub repositories.
    #[command(subcommand)]
    Github(GithubCommand),
}

#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// Repository name. Defaults to the name of the `origin` remote.
    #[arg(long)]
    pub project: Option<String>,
    /// GitHub user or organization owning the repository.
    #[arg(long, default_value = "greenbone")]
    pub space: String,
    /// Prefix of release tags.
    #[arg(long, default_value = "v")]
    pub git_tag_prefix: String,
    /// Environment variable holding the GitHub token.
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct ReleaseVersionArgs {
    /// Release this exact version.
    #[arg(long)]
    pub release_version: Option<String>,
    /// Derive the version from the current year and month.
    #[arg(long)]
    pub calendar: bool,
    /// Release the next patch version.
    #[arg(long)]
    pub patch: bool,
}

#[derive(Debug, Args, Clone)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(flatten)]
    pub version: ReleaseVersionArgs,
    /// Key for signed commits and tags. Defaults to git's `user.signingkey`.
    #[arg(long)]
    pub git_signing_key: Option<String>,
    /// Generate the changelog from conventional commits.
    #[arg(long, visible_alias = "cc")]
    pub conventional_commits: bool,
    /// Commit type configuration. Defaults to changelog.toml.
    #[arg(long)]
    pub cc_config: Option<PathBuf>,
    /// Changelog to update. Defaults to CHANGELOG.md.
    #[arg(long)]
    pub changelog: Option<PathBuf>,
    /// Show what would change without writing, committing or tagging.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Version to release. Defaults to the current project version.
    #[arg(long)]
    pub release_version: Option<String>,
    /// Version to continue with after the release.
    #[arg(long)]
    pub next_version: Option<String>,
    /// Key for signed commits. Defaults to git's `user.signingkey`.
    #[arg(long)]
    pub git_signing_key: Option<String>,
    /// Remote to push to.
    #[arg(long)]
    pub git_remote_name: Option<String>,
    /// Skip the empty changelog section after releasing.
    #[arg(long, visible_alias = "cc")]
    pub conventional_commits: bool,
    /// Changelog to extend. Defaults to CHANGELOG.md.
    #[arg(long)]
    pub changelog: Option<PathBuf>,
    /// Show what would happen without pushing or publishing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SignArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Version to sign. Defaults to the current project version.
    #[arg(long)]
    pub release_version: Option<String>,
    /// GPG key used for signing.
    #[arg(long)]
    pub signing_key: Option<String>,
    /// Passphrase of the signing key.
    #[arg(long, env = "RELKIT_GPG_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
    /// Download and sign, but do not upload.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ChangelogArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Commit type configuration. Defaults to changelog.toml.
    #[arg(long, alias = "config")]
    pub cc_config: Option<PathBuf>,
    /// Last released version. Defaults to the highest release tag.
    #[arg(long)]
    pub current_version: Option<String>,
    /// Version the changelog is written for.
    #[arg(long)]
    pub next_version: Option<String>,
    /// File name inside the changelog directory.
    #[arg(long, default_value = "unreleased.md")]
    pub output: String,
}

#[derive(Debug, Subcommand, Clone)]
pub enum VersionCommand {
    /// Print the current version.
    Show,
    /// Check that all version declarations agree with VERSION (or `current`).
    Verify { version: String },
    /// Set the project version.
    Update {
        version: String,
        /// Append `.dev1` to the version.
        #[arg(long)]
        develop: bool,
        /// Rewrite files even if the version is unchanged.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum GithubCommand {
    /// Create a pull request once both branches are known to exist.
    #[command(visible_alias = "pull-request")]
    Pr(PullRequestArgs),
    /// List the files a pull request touches, grouped by change type.
    FileStatus(FileStatusArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PullRequestArgs {
    /// Repository as `owner/name`.
    pub repo: String,
    /// Branch to create the pull request from.
    pub head: String,
    /// Branch the pull request targets.
    pub target: String,
    /// Title of the pull request.
    pub title: String,
    /// Markdown description. A literal `\n` becomes a line break.
    #[arg(short, long, default_value = "#empty body")]
    pub body: String,
    /// Environment variable holding the GitHub token.
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,
}

#[derive(Debug, Args, Clone)]
pub struct FileStatusArgs {
    /// Repository as `owner/name`.
    pub repo: String,
    /// Number of the pull request.
    pub pr_number: u64,
    /// Change types to list.
    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        default_values = ["added", "modified"]
    )]
    pub status: Vec<FileStatus>,
    /// Environment variable holding the GitHub token.
    #[arg(long, default_value = "GITHUB_TOKEN")]
    pub token_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
}

impl FileStatus {
    /// Maps the `status` of a pull-request file. Other states are ignored.
    pub fn from_api(status: &str) -> Option<Self> {
        match status {
            "added" => Some(Self::Added),
            "removed" | "deleted" => Some(Self::Deleted),
            "modified" => Some(Self::Modified),
            "renamed" => Some(Self::Renamed),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
            Self::Renamed => "Renamed",
        }
    }
}

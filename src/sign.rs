use crate::cli::SignArgs;
use crate::forge::{Forge, GitHubClient, archive_url};
use crate::git;
use crate::release::require_token;
use crate::reporter::{Reporter, TerminalReporter};
use crate::runner::{CommandRunner, ProcessRunner, run_checked};
use crate::version::Version;
use crate::version_file::ProjectFile;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

const SIGNATURE_CONTENT_TYPE: &str = "application/pgp-signature";

#[derive(Debug, Clone)]
pub struct SignOptions {
    pub project: Option<String>,
    pub space: String,
    pub tag_prefix: String,
    pub token_env: String,
    pub token: Option<String>,
    pub release_version: Option<Version>,
    pub signing_key: Option<String>,
    pub passphrase: Option<String>,
    pub dry_run: bool,
}

impl SignOptions {
    fn from_args(args: SignArgs) -> Result<Self> {
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
            signing_key: args.signing_key,
            passphrase: args.passphrase,
            dry_run: args.dry_run,
        })
    }
}

pub fn run(args: SignArgs) -> Result<()> {
    let repo_root = std::env::current_dir().context("Failed to determine current directory.")?;
    let options = SignOptions::from_args(args)?;
    let project = git::resolve_project(&mut ProcessRunner, &repo_root, options.project.as_deref())?;
    let mut forge = GitHubClient::new(&options.space, &project, options.token.clone())?;
    let options = SignOptions {
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

pub(crate) fn run_with(
    work_dir: &Path,
    options: &SignOptions,
    runner: &mut dyn CommandRunner,
    forge: &mut dyn Forge,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    if !options.dry_run {
        require_token(options.token.as_deref(), &options.token_env)?;
    }

    let project = git::resolve_project(runner, work_dir, options.project.as_deref())?;
    let release_version = match options.release_version {
        Some(release_version) => release_version,
        None => ProjectFile::detect(work_dir)?.current_version(runner)?,
    };
    let tag = format!("{}{release_version}", options.tag_prefix);

    let Some(release) = forge.release_by_tag(&tag)? else {
        bail!(
            "No release for tag {tag} found in {}/{project}.",
            options.space
        );
    };

    let mut files = Vec::new();
    for extension in ["zip", "tar.gz"] {
        let url = archive_url(&options.space, &project, &tag, extension);
        let destination = work_dir.join(format!("{project}-{release_version}.{extension}"));
        forge.download(&url, &destination)?;
        files.push(destination);
    }
    for asset in forge.release_assets(&release)? {
        let destination = work_dir.join(&asset.name);
        forge.download(&asset.browser_download_url, &destination)?;
        files.push(destination);
    }

    let mut signatures = Vec::with_capacity(files.len());
    for file in &files {
        reporter.info(&format!("Signing {}", file.display()));
        sign_file(runner, work_dir, file, options)?;
        signatures.push(signature_path(file));
    }

    if options.dry_run {
        reporter.info(&format!(
            "Dry run: {} signatures were not uploaded.",
            signatures.len()
        ));
        return Ok(());
    }

    for signature in &signatures {
        if let Err(err) = forge.upload_asset(&release, signature, SIGNATURE_CONTENT_TYPE) {
            reporter.error(&format!("Could not upload {}", signature.display()));
            return Err(err);
        }
        reporter.ok(&format!("Uploaded {}", signature.display()));
    }
    Ok(())
}

fn signature_path(file: &Path) -> PathBuf {
    let mut path = file.as_os_str().to_owned();
    path.push(".asc");
    PathBuf::from(path)
}

fn gpg_args(file: &Path, signing_key: Option<&str>, passphrase: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if passphrase.is_some() {
        args.extend(["--pinentry-mode".to_string(), "loopback".to_string()]);
    }
    if let Some(key) = signing_key {
        args.extend(["--default-key".to_string(), key.to_string()]);
    }
    args.extend(["--yes".to_string(), "--detach-sign".to_string()]);
    if let Some(passphrase) = passphrase {
        args.extend(["--passphrase".to_string(), passphrase.to_string()]);
    }
    args.extend(["--armor".to_string(), file.display().to_string()]);
    args
}

fn sign_file(
    runner: &mut dyn CommandRunner,
    work_dir: &Path,
    file: &Path,
    options: &SignOptions,
) -> Result<()> {
    let args = gpg_args(
        file,
        options.signing_key.as_deref().filter(|key| !key.is_empty()),
        options.passphrase.as_deref().filter(|passphrase| !passphrase.is_empty()),
    );
    run_checked(
        runner,
        work_dir,
        "gpg",
        &args,
        &[],
        &format!("Failed to sign `{}`.", file.display()),
    )?;
    Ok(())
}

use crate::error::ReleaseError;
use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, LINK};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const GITHUB_URL: &str = "https://github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub upload_url: String,
    pub assets_url: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRelease<'a> {
    pub tag_name: &'a str,
    pub name: &'a str,
    pub body: &'a str,
    pub draft: bool,
    pub prerelease: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest<'a> {
    pub head: &'a str,
    pub base: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
}

/// Release operations against the hosting forge.
pub trait Forge {
    fn create_release(&mut self, release: &NewRelease<'_>) -> Result<Release>;
    fn release_by_tag(&mut self, tag: &str) -> Result<Option<Release>>;
    fn release_assets(&mut self, release: &Release) -> Result<Vec<ReleaseAsset>>;
    fn download(&mut self, url: &str, destination: &Path) -> Result<()>;
    fn upload_asset(&mut self, release: &Release, file: &Path, content_type: &str) -> Result<()>;
}

/// Branch and pull-request queries on one repository.
pub trait PullRequestForge {
    /// False when the branch is missing or not visible with the token.
    fn branch_exists(&mut self, branch: &str) -> Result<bool>;
    fn pull_request_exists(&mut self, number: u64) -> Result<bool>;
    fn create_pull_request(&mut self, pull_request: &NewPullRequest<'_>) -> Result<()>;
    /// Every file touched by the pull request, across all pages.
    fn pull_request_files(&mut self, number: u64) -> Result<Vec<PullRequestFile>>;
}

pub fn archive_url(space: &str, project: &str, tag: &str, extension: &str) -> String {
    format!("{GITHUB_URL}/{space}/{project}/archive/refs/tags/{tag}.{extension}")
}

pub struct GitHubClient {
    client: Client,
    api_url: String,
    space: String,
    project: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(space: &str, project: &str, token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));

        let client = Client::builder()
            .user_agent(concat!("relkit/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build the HTTP client.")?;

        Ok(Self {
            client,
            api_url: GITHUB_API_URL.to_string(),
            space: space.to_string(),
            project: project.to_string(),
            token,
        })
    }

    /// Client for an `owner/name` repository.
    pub fn for_repository(repository: &str, token: Option<String>) -> Result<Self> {
        match repository.trim().split_once('/') {
            Some((space, project)) if !space.is_empty() && !project.is_empty() => {
                Self::new(space, project, token)
            }
            _ => bail!("Repository `{repository}` must have the form owner/name."),
        }
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{path}", self.api_url, self.space, self.project)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        debug!(url, "sending request");
        let response = self
            .authorized(request)
            .send()
            .with_context(|| format!("Failed to send request to {url}."))?;
        check_status(response, url)
    }

    fn is_success(&self, url: &str) -> Result<bool> {
        debug!(url, "checking existence");
        let response = self
            .authorized(self.client.get(url))
            .send()
            .with_context(|| format!("Failed to send request to {url}."))?;
        Ok(response.status().is_success())
    }

    fn fetch_page(&self, url: &str) -> Result<RawPage> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .with_context(|| format!("Failed to send request to {url}."))?;
        let status = response.status().as_u16();
        let link = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .with_context(|| format!("Failed to read response from {url}."))?;
        Ok(RawPage { status, link, body })
    }

    fn collect_pages<T: DeserializeOwned>(&self, first_url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in Pages::<T, _>::new(first_url, |url: &str| self.fetch_page(url)) {
            items.extend(page?);
        }
        Ok(items)
    }
}

impl Forge for GitHubClient {
    fn create_release(&mut self, release: &NewRelease<'_>) -> Result<Release> {
        let url = self.repo_url("/releases");
        info!(tag = release.tag_name, "creating release");
        let response = self.send(self.client.post(&url).json(release), &url)?;
        response
            .json()
            .with_context(|| format!("Unexpected release payload from {url}."))
    }

    fn release_by_tag(&mut self, tag: &str) -> Result<Option<Release>> {
        let url = self.repo_url(&format!("/releases/tags/{tag}"));
        match self.send(self.client.get(&url), &url) {
            Ok(response) => response
                .json()
                .map(Some)
                .with_context(|| format!("Unexpected release payload from {url}.")),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn release_assets(&mut self, release: &Release) -> Result<Vec<ReleaseAsset>> {
        self.collect_pages(&release.assets_url)
    }

    fn download(&mut self, url: &str, destination: &Path) -> Result<()> {
        let response = self.send(self.client.get(url), url)?;
        let progress = match response.content_length() {
            Some(length) => ProgressBar::new(length).with_style(
                ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")
                    .context("Invalid progress template.")?
                    .progress_chars("=> "),
            ),
            None => ProgressBar::new_spinner(),
        };
        progress.set_message(destination.display().to_string());

        let mut file = File::create(destination)
            .with_context(|| format!("Failed to create `{}`.", destination.display()))?;
        io::copy(&mut progress.wrap_read(response), &mut file)
            .with_context(|| format!("Failed to download {url}."))?;
        progress.finish_and_clear();
        Ok(())
    }

    fn upload_asset(&mut self, release: &Release, file: &Path, content_type: &str) -> Result<()> {
        let name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .with_context(|| format!("`{}` has no file name.", file.display()))?;
        let contents =
            fs::read(file).with_context(|| format!("Failed to read `{}`.", file.display()))?;

        let url = upload_url(&release.upload_url);
        info!(asset = %name, "uploading");
        let request = self
            .client
            .post(&url)
            .query(&[("name", name.as_str())])
            .header(CONTENT_TYPE, content_type)
            .body(contents);
        self.send(request, &url)?;
        Ok(())
    }
}

impl PullRequestForge for GitHubClient {
    fn branch_exists(&mut self, branch: &str) -> Result<bool> {
        self.is_success(&self.repo_url(&format!("/branches/{branch}")))
    }

    fn pull_request_exists(&mut self, number: u64) -> Result<bool> {
        self.is_success(&self.repo_url(&format!("/pulls/{number}")))
    }

    fn create_pull_request(&mut self, pull_request: &NewPullRequest<'_>) -> Result<()> {
        let url = self.repo_url("/pulls");
        info!(head = pull_request.head, base = pull_request.base, "creating pull request");
        self.send(self.client.post(&url).json(pull_request), &url)?;
        Ok(())
    }

    fn pull_request_files(&mut self, number: u64) -> Result<Vec<PullRequestFile>> {
        self.collect_pages(&self.repo_url(&format!("/pulls/{number}/files?per_page=100")))
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ReleaseError>(),
        Some(ReleaseError::Http { status: 404, .. })
    )
}

fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(http_error(url, status.as_u16(), &body))
}

fn http_error(url: &str, status: u16, body: &str) -> anyhow::Error {
    ReleaseError::Http {
        url: url.to_string(),
        status,
        message: error_message(body),
    }
    .into()
}

/// The `message` of a GitHub error payload, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// The upload URL without its `{?name,label}` URI template suffix.
pub fn upload_url(template: &str) -> String {
    match template.find('{') {
        Some(index) => template[..index].to_string(),
        None => template.to_string(),
    }
}

/// Target of the `rel="next"` entry in a `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|target| target.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// A fetched page before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub status: u16,
    pub link: Option<String>,
    pub body: String,
}

/// Lazily fetches one page per `next` call until no `rel="next"` link is left.
/// An error page ends the walk.
pub struct Pages<T, F> {
    fetch: F,
    next_url: Option<String>,
    item: PhantomData<T>,
}

impl<T, F> Pages<T, F>
where
    F: FnMut(&str) -> Result<RawPage>,
{
    pub fn new(first_url: impl Into<String>, fetch: F) -> Self {
        Self {
            fetch,
            next_url: Some(first_url.into()),
            item: PhantomData,
        }
    }
}

impl<T, F> Iterator for Pages<T, F>
where
    T: DeserializeOwned,
    F: FnMut(&str) -> Result<RawPage>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next_url.take()?;
        debug!(url = %url, "fetching page");

        let page = match (self.fetch)(&url) {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };
        if !(200..300).contains(&page.status) {
            return Some(Err(http_error(&url, page.status, &page.body)));
        }

        self.next_url = page.link.as_deref().and_then(parse_next_link);
        Some(
            serde_json::from_str(&page.body)
                .with_context(|| format!("Unexpected page payload from {url}.")),
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    pub fn release(tag: &str) -> Release {
        Release {
            tag_name: tag.to_string(),
            name: None,
            upload_url: "https://uploads.github.com/repos/greenbone/foo/releases/1/assets{?name,label}"
                .to_string(),
            assets_url: "https://api.github.com/repos/greenbone/foo/releases/1/assets".to_string(),
            html_url: String::new(),
        }
    }

    /// In-memory forge. Downloads write the URL into the destination file.
    #[derive(Default)]
    pub struct FakeForge {
        pub releases: BTreeMap<String, Release>,
        pub assets: Vec<ReleaseAsset>,
        pub created: Vec<(String, String, String)>,
        pub downloads: Vec<(String, PathBuf)>,
        pub uploads: Vec<(PathBuf, String)>,
        pub fail_create: Option<u16>,
        pub fail_upload: Option<u16>,
    }

    impl FakeForge {
        fn failure(status: u16, url: &str) -> anyhow::Error {
            ReleaseError::Http {
                url: url.to_string(),
                status,
                message: "fake failure".to_string(),
            }
            .into()
        }
    }

    impl Forge for FakeForge {
        fn create_release(&mut self, release: &NewRelease<'_>) -> Result<Release> {
            if let Some(status) = self.fail_create {
                return Err(Self::failure(status, "releases"));
            }
            self.created.push((
                release.tag_name.to_string(),
                release.name.to_string(),
                release.body.to_string(),
            ));
            let created = self::release(release.tag_name);
            self.releases
                .insert(release.tag_name.to_string(), created.clone());
            Ok(created)
        }

        fn release_by_tag(&mut self, tag: &str) -> Result<Option<Release>> {
            Ok(self.releases.get(tag).cloned())
        }

        fn release_assets(&mut self, _release: &Release) -> Result<Vec<ReleaseAsset>> {
            Ok(self.assets.clone())
        }

        fn download(&mut self, url: &str, destination: &Path) -> Result<()> {
            fs::write(destination, url)?;
            self.downloads
                .push((url.to_string(), destination.to_path_buf()));
            Ok(())
        }

        fn upload_asset(
            &mut self,
            release: &Release,
            file: &Path,
            content_type: &str,
        ) -> Result<()> {
            if let Some(status) = self.fail_upload {
                return Err(Self::failure(status, &upload_url(&release.upload_url)));
            }
            self.uploads
                .push((file.to_path_buf(), content_type.to_string()));
            Ok(())
        }
    }

    /// In-memory repository with branches, pull requests and their files.
    #[derive(Default)]
    pub struct FakePullRequests {
        pub branches: Vec<String>,
        pub pull_requests: Vec<u64>,
        pub files: Vec<PullRequestFile>,
        pub created: Vec<(String, String, String, String)>,
    }

    pub fn changed_file(filename: &str, status: &str) -> PullRequestFile {
        PullRequestFile {
            filename: filename.to_string(),
            status: status.to_string(),
        }
    }

    impl PullRequestForge for FakePullRequests {
        fn branch_exists(&mut self, branch: &str) -> Result<bool> {
            Ok(self.branches.iter().any(|known| known == branch))
        }

        fn pull_request_exists(&mut self, number: u64) -> Result<bool> {
            Ok(self.pull_requests.contains(&number))
        }

        fn create_pull_request(&mut self, pull_request: &NewPullRequest<'_>) -> Result<()> {
            self.created.push((
                pull_request.head.to_string(),
                pull_request.base.to_string(),
                pull_request.title.to_string(),
                pull_request.body.to_string(),
            ));
            Ok(())
        }

        fn pull_request_files(&mut self, number: u64) -> Result<Vec<PullRequestFile>> {
            if !self.pull_requests.contains(&number) {
                return Err(Self::missing(number));
            }
            Ok(self.files.clone())
        }
    }

    impl FakePullRequests {
        fn missing(number: u64) -> anyhow::Error {
            ReleaseError::Http {
                url: format!("pulls/{number}/files"),
                status: 404,
                message: "Not Found".to_string(),
            }
            .into()
        }
    }
}

use crate::error::ReleaseError;
use crate::reporter::Reporter;
use crate::runner::{CommandRunner, run_checked};
use crate::template::{VersionModuleContext, render_version_module};
use crate::version::{Version, strip_version_prefix};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use toml_edit::{DocumentMut, Item, table, value};

static CMAKE_PROJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bproject\s*\([^)]*?\bVERSION\s+([0-9]+(?:\.[0-9]+){1,2})[^)]*\)")
        .expect("cmake project pattern is valid")
});

static CMAKE_DEV_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)set\s*\(\s*PROJECT_DEV_VERSION\s+([0-9]+)\s*\)")
        .expect("cmake dev version pattern is valid")
});

static VERSION_MODULE_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^__version__\s*=\s*["']([^"']+)["']"#)
        .expect("version module pattern is valid")
});

/// Kinds of project definition files, in the order they are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    CMake,
    Pyproject,
    Cargo,
    Go,
}

impl ProjectKind {
    const DETECTION_ORDER: [ProjectKind; 4] = [Self::CMake, Self::Pyproject, Self::Cargo, Self::Go];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::CMake => "CMakeLists.txt",
            Self::Pyproject => "pyproject.toml",
            Self::Cargo => "Cargo.toml",
            Self::Go => "go.mod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpdate {
    pub previous: Option<Version>,
    pub new: Version,
    pub changed_files: Vec<PathBuf>,
}

impl VersionUpdate {
    pub fn is_noop(&self) -> bool {
        self.changed_files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectFile {
    kind: ProjectKind,
    repo_root: PathBuf,
}

impl ProjectFile {
    pub fn detect(repo_root: &Path) -> Result<Self> {
        ProjectKind::DETECTION_ORDER
            .into_iter()
            .find(|kind| repo_root.join(kind.file_name()).is_file())
            .map(|kind| Self {
                kind,
                repo_root: repo_root.to_path_buf(),
            })
            .ok_or_else(|| ReleaseError::ConfigurationMissing(repo_root.display().to_string()).into())
    }

    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.file_name())
    }

    fn path(&self) -> PathBuf {
        self.repo_root.join(self.kind.file_name())
    }

    fn read(&self) -> Result<String> {
        let path = self.path();
        fs::read_to_string(&path).with_context(|| format!("Failed to read `{}`.", path.display()))
    }

    fn read_document(&self) -> Result<DocumentMut> {
        let path = self.path();
        self.read()?
            .parse::<DocumentMut>()
            .with_context(|| format!("Failed to parse TOML file `{}`.", path.display()))
    }

    pub fn current_version(&self, runner: &mut dyn CommandRunner) -> Result<Version> {
        match self.kind {
            ProjectKind::CMake => cmake_version(&self.read()?),
            ProjectKind::Pyproject => pyproject_version(&self.read_document()?),
            ProjectKind::Cargo => cargo_version(&self.read_document()?),
            ProjectKind::Go => latest_tag_version(runner, &self.repo_root),
        }
        .with_context(|| format!("Failed to read the version from `{}`.", self.kind.file_name()))
    }

    /// Writes `new_version` into the project files. In develop mode a release
    /// version gets `.dev1` appended. An unchanged version is left alone
    /// unless `force` is set.
    pub fn update_version(
        &self,
        runner: &mut dyn CommandRunner,
        new_version: &Version,
        develop: bool,
        force: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<VersionUpdate> {
        let new = if develop && !new_version.is_dev() {
            new_version.with_dev(1)
        } else {
            *new_version
        };

        if self.kind == ProjectKind::Go {
            reporter.warning("Updating the version of a go module is not possible.");
            return Ok(VersionUpdate {
                previous: None,
                new,
                changed_files: Vec::new(),
            });
        }

        let previous = self.current_version(runner)?;
        if !force && previous == new {
            reporter.info("Version is already up-to-date.");
            return Ok(VersionUpdate {
                previous: Some(previous),
                new,
                changed_files: Vec::new(),
            });
        }

        let changed_files = match self.kind {
            ProjectKind::CMake => {
                let updated = update_cmake(&self.read()?, &new)?;
                write_file(&self.path(), &updated)?;
                vec![self.relative_path()]
            }
            ProjectKind::Pyproject => self.update_pyproject(&new)?,
            ProjectKind::Cargo => {
                let mut document = self.read_document()?;
                document["package"]["version"] = value(cargo_version_string(&new)?);
                write_file(&self.path(), &document.to_string())?;
                vec![self.relative_path()]
            }
            ProjectKind::Go => Vec::new(),
        };

        reporter.ok(&format!("Updated version from {previous} to {new}"));
        Ok(VersionUpdate {
            previous: Some(previous),
            new,
            changed_files,
        })
    }

    fn update_pyproject(&self, new: &Version) -> Result<Vec<PathBuf>> {
        let mut document = self.read_document()?;
        let module_file = version_module_file(&document);

        let tool = document
            .entry("tool")
            .or_insert(table())
            .as_table_mut()
            .ok_or_else(|| anyhow!("`tool` in pyproject.toml is not a table."))?;
        tool.set_implicit(true);
        let poetry = tool
            .entry("poetry")
            .or_insert(table())
            .as_table_mut()
            .ok_or_else(|| anyhow!("`tool.poetry` in pyproject.toml is not a table."))?;
        poetry["version"] = value(new.to_string());
        write_file(&self.path(), &document.to_string())?;

        let mut changed_files = vec![self.relative_path()];
        if let Some(module_file) = module_file {
            let rendered = render_version_module(&VersionModuleContext {
                version: &new.to_string(),
            })?;
            let module_path = self.repo_root.join(&module_file);
            if let Some(parent) = module_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create `{}`.", parent.display()))?;
            }
            write_file(&module_path, &rendered)?;
            changed_files.push(module_file);
        }
        Ok(changed_files)
    }

    /// Checks that all version declarations agree and, when given, match
    /// `expected`.
    pub fn verify_version(
        &self,
        runner: &mut dyn CommandRunner,
        expected: Option<&Version>,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        if self.kind == ProjectKind::Go {
            let shown = expected.map(Version::to_string).unwrap_or_else(|| "current".to_string());
            reporter.info(&format!(
                "Golang does not provide a file containing the version. Thus {shown} can not be verified."
            ));
            return Ok(());
        }

        let current = self.current_version(runner)?;
        if self.kind == ProjectKind::Pyproject
            && let Some(module_file) = version_module_file(&self.read_document()?)
        {
            let module_path = self.repo_root.join(&module_file);
            let module_version = module_version(&module_path)?;
            if module_version != current {
                return Err(ReleaseError::VersionMismatch(format!(
                    "The version {current} in pyproject.toml doesn't match the version \
                     {module_version} in {}.",
                    module_file.display()
                ))
                .into());
            }
        }

        if let Some(expected) = expected
            && *expected != current
        {
            return Err(ReleaseError::VersionMismatch(format!(
                "Provided version {expected} does not match the current version {current}."
            ))
            .into());
        }

        reporter.ok("OK");
        Ok(())
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut output = content.to_string();
    if !output.ends_with('\n') {
        output.push('\n');
    }
    fs::write(path, output).with_context(|| format!("Failed to write `{}`.", path.display()))
}

fn cmake_version(content: &str) -> Result<Version> {
    let Some(captures) = CMAKE_PROJECT.captures(content) else {
        bail!("No `project(... VERSION x.y.z)` call found.");
    };
    let version = Version::parse(&captures[1])?;

    let dev = CMAKE_DEV_VERSION
        .captures(content)
        .map(|captures| captures[1].parse::<u64>())
        .transpose()
        .context("`PROJECT_DEV_VERSION` is not a number.")?
        .unwrap_or(0);

    Ok(if dev > 0 {
        version.with_dev(dev)
    } else {
        version
    })
}

fn update_cmake(content: &str, new: &Version) -> Result<String> {
    let Some(version_span) = CMAKE_PROJECT
        .captures(content)
        .and_then(|captures| captures.get(1))
    else {
        bail!("No `project(... VERSION x.y.z)` call found.");
    };

    let mut updated = String::with_capacity(content.len() + 32);
    updated.push_str(&content[..version_span.start()]);
    updated.push_str(&new.release().to_string());
    updated.push_str(&content[version_span.end()..]);

    let dev = new.dev.unwrap_or(0);
    if let Some(dev_range) = CMAKE_DEV_VERSION
        .captures(&updated)
        .and_then(|captures| captures.get(1))
        .map(|found| found.range())
    {
        updated.replace_range(dev_range, &dev.to_string());
        return Ok(updated);
    }

    let Some(project_call) = CMAKE_PROJECT.find(&updated) else {
        bail!("No `project(... VERSION x.y.z)` call found.");
    };
    updated.insert_str(
        project_call.end(),
        &format!("\n\nset(PROJECT_DEV_VERSION {dev})"),
    );
    Ok(updated)
}

fn pyproject_version(document: &DocumentMut) -> Result<Version> {
    let Some(raw) = document
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(|poetry| poetry.get("version"))
        .and_then(Item::as_str)
    else {
        bail!("`tool.poetry.version` is missing.");
    };
    Ok(Version::parse(raw)?)
}

fn version_module_file(document: &DocumentMut) -> Option<PathBuf> {
    document
        .get("tool")
        .and_then(|tool| tool.get("relkit"))
        .and_then(|relkit| relkit.get("version-module-file"))
        .and_then(Item::as_str)
        .map(PathBuf::from)
}

fn module_version(path: &Path) -> Result<Version> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read version module `{}`.", path.display()))?;
    let Some(captures) = VERSION_MODULE_ASSIGNMENT.captures(&content) else {
        bail!("No `__version__` assignment found in `{}`.", path.display());
    };
    Ok(Version::parse(&captures[1])?)
}

fn cargo_version(document: &DocumentMut) -> Result<Version> {
    let Some(raw) = document
        .get("package")
        .and_then(|package| package.get("version"))
        .and_then(Item::as_str)
    else {
        bail!("`package.version` is missing or inherited from the workspace.");
    };

    let parsed = semver::Version::parse(raw)
        .map_err(|err| ReleaseError::version_parse(raw, err.to_string()))?;
    let version = Version::new(parsed.major, parsed.minor, parsed.patch);
    if parsed.pre.is_empty() {
        return Ok(version);
    }

    let dev = parsed
        .pre
        .as_str()
        .strip_prefix("dev.")
        .and_then(|number| number.parse::<u64>().ok())
        .ok_or_else(|| {
            ReleaseError::version_parse(raw, "only `-dev.N` prereleases are supported")
        })?;
    Ok(version.with_dev(dev))
}

fn cargo_version_string(version: &Version) -> Result<String> {
    let mut semver = semver::Version::new(version.major, version.minor, version.micro);
    if let Some(dev) = version.dev {
        semver.pre = semver::Prerelease::new(&format!("dev.{dev}"))
            .with_context(|| format!("Cannot express `{version}` as a Cargo prerelease."))?;
    }
    Ok(semver.to_string())
}

fn latest_tag_version(runner: &mut dyn CommandRunner, repo_root: &Path) -> Result<Version> {
    let args = ["rev-list", "--tags", "--max-count=1"].map(String::from);
    let output = run_checked(runner, repo_root, "git", &args, &[], "Failed to list tagged commits.")?;
    let commit = output.stdout.trim();
    if commit.is_empty() {
        bail!("No version tag found. Maybe this module has not been released at all.");
    }

    let args = ["describe".to_string(), "--tags".to_string(), commit.to_string()];
    let output = run_checked(runner, repo_root, "git", &args, &[], "Failed to describe the latest tag.")?;
    Ok(Version::parse(strip_version_prefix(&output.stdout))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::testing::{Level, RecordingReporter};
    use crate::runner::testing::{ScriptedRunner, ok};
    use tempfile::tempdir;

    fn v(value: &str) -> Version {
        Version::parse(value).unwrap()
    }

    const CMAKE: &str = "cmake_minimum_required(VERSION 3.0)\n\
project(gvm-libs\n  VERSION 21.4.2\n  LANGUAGES C)\n\
set(PROJECT_DEV_VERSION 1)\n";

    #[test]
    fn detect_prefers_cmake_over_pyproject() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("pyproject.toml"), "").unwrap();
        fs::write(temp_dir.path().join("CMakeLists.txt"), CMAKE).unwrap();

        let project = ProjectFile::detect(temp_dir.path()).unwrap();
        assert_eq!(project.kind(), ProjectKind::CMake);
    }

    #[test]
    fn detect_without_project_file_is_configuration_missing() {
        let temp_dir = tempdir().unwrap();
        let err = ProjectFile::detect(temp_dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn reads_cmake_version_with_dev_marker() {
        assert_eq!(cmake_version(CMAKE).unwrap(), v("21.4.2.dev1"));
        let released = CMAKE.replace("PROJECT_DEV_VERSION 1", "PROJECT_DEV_VERSION 0");
        assert_eq!(cmake_version(&released).unwrap(), v("21.4.2"));
    }

    #[test]
    fn updates_cmake_version_and_dev_flag() {
        let updated = update_cmake(CMAKE, &v("21.4.3")).unwrap();
        assert!(updated.contains("VERSION 21.4.3\n  LANGUAGES C)"));
        assert!(updated.contains("set(PROJECT_DEV_VERSION 0)"));
        assert!(updated.starts_with("cmake_minimum_required(VERSION 3.0)\n"));
    }

    #[test]
    fn inserts_missing_cmake_dev_line_after_project_call() {
        let content = "project(demo VERSION 1.0.0)\nadd_subdirectory(src)\n";
        let updated = update_cmake(content, &v("1.0.1.dev1")).unwrap();
        assert_eq!(
            updated,
            "project(demo VERSION 1.0.1)\n\nset(PROJECT_DEV_VERSION 1)\nadd_subdirectory(src)\n"
        );
        assert_eq!(cmake_version(&updated).unwrap(), v("1.0.1.dev1"));
    }

    #[test]
    fn pyproject_update_writes_manifest_and_module() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(
            root.join("pyproject.toml"),
            "[tool.poetry]\nname = \"demo\"  # keep me\nversion = \"1.0.0\"\n\n\
[tool.relkit]\nversion-module-file = \"demo/__version__.py\"\n",
        )
        .unwrap();

        let project = ProjectFile::detect(root).unwrap();
        let mut runner = ScriptedRunner::new(Vec::new());
        let mut reporter = RecordingReporter::default();
        let update = project
            .update_version(&mut runner, &v("1.0.1"), true, false, &mut reporter)
            .unwrap();

        assert_eq!(update.previous, Some(v("1.0.0")));
        assert_eq!(update.new, v("1.0.1.dev1"));
        assert_eq!(
            update.changed_files,
            vec![
                PathBuf::from("pyproject.toml"),
                PathBuf::from("demo/__version__.py")
            ]
        );

        let manifest = fs::read_to_string(root.join("pyproject.toml")).unwrap();
        assert!(manifest.contains("name = \"demo\"  # keep me"));
        assert!(manifest.contains("version = \"1.0.1.dev1\""));
        let module = fs::read_to_string(root.join("demo/__version__.py")).unwrap();
        assert!(module.contains("__version__ = \"1.0.1.dev1\""));

        project
            .verify_version(&mut runner, Some(&v("1.0.1.dev1")), &mut reporter)
            .unwrap();
        assert!(reporter.contains(Level::Ok, "OK"));
    }

    #[test]
    fn equal_version_is_noop_without_force() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("pyproject.toml"), "[tool.poetry]\nversion = \"2.0.0\"\n").unwrap();

        let project = ProjectFile::detect(root).unwrap();
        let mut runner = ScriptedRunner::new(Vec::new());
        let mut reporter = RecordingReporter::default();

        let update = project
            .update_version(&mut runner, &v("2.0.0"), false, false, &mut reporter)
            .unwrap();
        assert!(update.is_noop());
        assert!(reporter.contains(Level::Info, "already up-to-date"));

        let forced = project
            .update_version(&mut runner, &v("2.0.0"), false, true, &mut reporter)
            .unwrap();
        assert_eq!(forced.changed_files, vec![PathBuf::from("pyproject.toml")]);
    }

    #[test]
    fn verify_detects_module_disagreement_and_wrong_expectation() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(
            root.join("pyproject.toml"),
            "[tool.poetry]\nversion = \"1.2.3\"\n[tool.relkit]\nversion-module-file = \"v.py\"\n",
        )
        .unwrap();
        fs::write(root.join("v.py"), "__version__ = \"1.2.2\"\n").unwrap();

        let project = ProjectFile::detect(root).unwrap();
        let mut runner = ScriptedRunner::new(Vec::new());
        let mut reporter = RecordingReporter::default();
        let err = project
            .verify_version(&mut runner, None, &mut reporter)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::VersionMismatch(_))
        ));

        fs::write(root.join("v.py"), "__version__ = '1.2.3'\n").unwrap();
        project.verify_version(&mut runner, None, &mut reporter).unwrap();
        let err = project
            .verify_version(&mut runner, Some(&v("1.2.4")), &mut reporter)
            .unwrap_err();
        assert!(err.to_string().contains("Provided version 1.2.4"));
    }

    #[test]
    fn cargo_dev_versions_use_prerelease() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(
            root.join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.3.0-dev.2\"\nedition = \"2024\"\n",
        )
        .unwrap();

        let project = ProjectFile::detect(root).unwrap();
        let mut runner = ScriptedRunner::new(Vec::new());
        let mut reporter = RecordingReporter::default();
        assert_eq!(project.current_version(&mut runner).unwrap(), v("0.3.0.dev2"));

        project
            .update_version(&mut runner, &v("0.3.1"), true, false, &mut reporter)
            .unwrap();
        let manifest = fs::read_to_string(root.join("Cargo.toml")).unwrap();
        assert!(manifest.contains("version = \"0.3.1-dev.1\""));
        assert!(manifest.contains("edition = \"2024\""));
    }

    #[test]
    fn cargo_rejects_foreign_prerelease() {
        let document = "[package]\nversion = \"1.0.0-beta.1\"\n"
            .parse::<DocumentMut>()
            .unwrap();
        let err = cargo_version(&document).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::VersionParse { .. })
        ));
    }

    #[test]
    fn go_module_version_comes_from_latest_tag() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("go.mod"), "module example.com/demo\n").unwrap();

        let project = ProjectFile::detect(temp_dir.path()).unwrap();
        let mut runner = ScriptedRunner::new(vec![ok("abc123\n"), ok("v1.4.0\n")]);
        assert_eq!(project.current_version(&mut runner).unwrap(), v("1.4.0"));
        assert_eq!(
            runner.lines(),
            vec![
                "git rev-list --tags --max-count=1".to_string(),
                "git describe --tags abc123".to_string(),
            ]
        );

        let mut reporter = RecordingReporter::default();
        let update = project
            .update_version(&mut runner, &v("1.5.0"), false, false, &mut reporter)
            .unwrap();
        assert!(update.is_noop());
        assert!(reporter.contains(Level::Warning, "go module"));
    }
}

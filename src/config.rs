use crate::conventional::CommitTypeRule;
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "changelog.toml";
pub const DEFAULT_CHANGELOG_DIR: &str = "changelog";

const DEFAULT_COMMIT_TYPES: [(&str, &str); 4] = [
    ("^add", "Added"),
    ("^remove", "Removed"),
    ("^change", "Changed"),
    ("^fix", "Bug Fixes"),
];

#[derive(Debug, Clone)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Discovered(PathBuf),
    Defaulted,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(path) | Self::Discovered(path) => Some(path.as_path()),
            Self::Defaulted => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangelogConfig {
    pub changelog_dir: String,
    pub commit_types: Vec<CommitTypeRule>,
    pub source: ConfigSource,
    pub warnings: Vec<String>,
}

#[derive(Debug, facet::Facet)]
struct RawChangelogConfig {
    changelog_dir: Option<String>,
    commit_types: Option<Vec<RawCommitType>>,
}

#[derive(Debug, facet::Facet)]
struct RawCommitType {
    message: String,
    group: String,
}

fn default_commit_types() -> Result<Vec<CommitTypeRule>> {
    DEFAULT_COMMIT_TYPES
        .iter()
        .map(|(message, group)| CommitTypeRule::new(message, group))
        .collect()
}

/// Loads the commit-type configuration, falling back to the built-in rules
/// when no file is found at the default location.
pub fn load(explicit_path: Option<&Path>, repo_root: &Path) -> Result<ChangelogConfig> {
    let Some(source) = resolve_config_location(explicit_path, repo_root)? else {
        return Ok(ChangelogConfig {
            changelog_dir: DEFAULT_CHANGELOG_DIR.to_string(),
            commit_types: default_commit_types()?,
            source: ConfigSource::Defaulted,
            warnings: Vec::new(),
        });
    };
    let Some(path) = source.path() else {
        bail!("Config source without a path cannot be read.");
    };

    let raw_contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file `{}`.", path.display()))?;

    let parsed_toml = raw_contents
        .parse::<toml::Value>()
        .with_context(|| format!("Config file `{}` is not valid TOML.", path.display()))?;
    let warnings = collect_warnings(&parsed_toml);

    let raw: RawChangelogConfig = facet_toml::from_str(&raw_contents).with_context(|| {
        format!(
            "Config file `{}` has unsupported value types.",
            path.display()
        )
    })?;

    let changelog_dir = match raw.changelog_dir {
        Some(dir) => normalize_repo_relative_path(&dir, "`changelog_dir`")?,
        None => DEFAULT_CHANGELOG_DIR.to_string(),
    };

    let commit_types = match raw.commit_types {
        Some(raw_types) => resolve_commit_types(raw_types)?,
        None => default_commit_types()?,
    };

    Ok(ChangelogConfig {
        changelog_dir,
        commit_types,
        source,
        warnings,
    })
}

fn resolve_commit_types(raw_types: Vec<RawCommitType>) -> Result<Vec<CommitTypeRule>> {
    if raw_types.is_empty() {
        bail!("`commit_types` cannot be empty.");
    }

    let mut rules = Vec::with_capacity(raw_types.len());
    for (index, raw) in raw_types.into_iter().enumerate() {
        let message = raw.message.trim();
        let group = raw.group.trim();
        if message.is_empty() {
            bail!("`commit_types[{index}].message` cannot be empty.");
        }
        if group.is_empty() {
            bail!("`commit_types[{index}].group` cannot be empty.");
        }
        rules.push(CommitTypeRule::new(message, group)?);
    }
    Ok(rules)
}

fn normalize_repo_relative_path(value: &str, label: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{label} cannot be empty.");
    }

    let path = Path::new(trimmed);
    if path.is_absolute() {
        bail!("{label} `{trimmed}` must be repository-relative.");
    }

    for component in path.components() {
        match component {
            Component::CurDir | Component::Normal(_) => {}
            Component::ParentDir => {
                bail!("{label} `{trimmed}` cannot contain `..`.");
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("{label} `{trimmed}` must be repository-relative.");
            }
        }
    }

    Ok(trimmed.to_string())
}

fn collect_warnings(parsed: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(root) = parsed.as_table() else {
        return warnings;
    };

    let allowed_root: BTreeSet<&str> = BTreeSet::from(["changelog_dir", "commit_types"]);
    for key in root
        .keys()
        .filter(|key| !allowed_root.contains(key.as_str()))
    {
        warnings.push(format!("Unknown config key `{key}` was ignored."));
    }

    let Some(commit_types) = root.get("commit_types").and_then(toml::Value::as_array) else {
        return warnings;
    };

    let allowed_commit_type: BTreeSet<&str> = BTreeSet::from(["message", "group"]);
    for (index, entry) in commit_types.iter().enumerate() {
        let Some(table) = entry.as_table() else {
            continue;
        };
        for key in table
            .keys()
            .filter(|key| !allowed_commit_type.contains(key.as_str()))
        {
            warnings.push(format!(
                "Unknown config key `commit_types[{index}].{key}` was ignored."
            ));
        }
    }

    warnings
}

fn resolve_config_location(
    explicit_path: Option<&Path>,
    repo_root: &Path,
) -> Result<Option<ConfigSource>> {
    if let Some(explicit) = explicit_path {
        let explicit = if explicit.is_absolute() {
            explicit.to_path_buf()
        } else {
            repo_root.join(explicit)
        };
        if !explicit.is_file() {
            bail!(
                "Config file `{}` was not found. Pass a valid path with `--cc-config`.",
                explicit.display()
            );
        }
        return Ok(Some(ConfigSource::Explicit(explicit)));
    }

    let path = repo_root.join(DEFAULT_CONFIG_FILE);
    if path.is_file() {
        return Ok(Some(ConfigSource::Discovered(path)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn groups(config: &ChangelogConfig) -> Vec<&str> {
        config
            .commit_types
            .iter()
            .map(|rule| rule.group.as_str())
            .collect()
    }

    #[test]
    fn returns_defaults_when_no_config_file_exists() {
        let temp_dir = tempdir().unwrap();
        let config = load(None, temp_dir.path()).unwrap();

        assert_eq!(config.changelog_dir, "changelog");
        assert_eq!(groups(&config), vec!["Added", "Removed", "Changed", "Bug Fixes"]);
        assert!(matches!(config.source, ConfigSource::Defaulted));
    }

    #[test]
    fn discovers_changelog_toml_in_repo_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(
            root.join("changelog.toml"),
            r#"
changelog_dir = "docs/changes"
commit_types = [
  { message = "^feat", group = "Features" },
  { message = "^fix", group = "Bug Fixes" },
]
"#,
        )
        .unwrap();

        let config = load(None, root).unwrap();
        assert_eq!(config.changelog_dir, "docs/changes");
        assert_eq!(groups(&config), vec!["Features", "Bug Fixes"]);
        assert!(matches!(config.source, ConfigSource::Discovered(_)));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn explicit_config_path_wins_over_discovery() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("changelog.toml"), "changelog_dir = \"found\"").unwrap();
        fs::write(root.join("custom.toml"), "changelog_dir = \"explicit\"").unwrap();

        let config = load(Some(Path::new("custom.toml")), root).unwrap();
        assert_eq!(config.changelog_dir, "explicit");
        assert_eq!(groups(&config).len(), 4);
        assert!(matches!(config.source, ConfigSource::Explicit(_)));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let err = load(Some(Path::new("nope.toml")), temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("was not found"));
    }

    #[test]
    fn fails_on_invalid_toml() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("changelog.toml"), "commit_types = [").unwrap();

        let err = load(None, temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("not valid TOML"));
    }

    #[test]
    fn rejects_invalid_regex_in_commit_type() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("changelog.toml"),
            "commit_types = [{ message = \"(add\", group = \"Added\" }]",
        )
        .unwrap();

        let err = load(None, temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a valid regular expression"));
    }

    #[test]
    fn rejects_empty_commit_type_list() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("changelog.toml"), "commit_types = []").unwrap();

        let err = load(None, temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn rejects_parent_segments_in_changelog_dir() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("changelog.toml"),
            "changelog_dir = \"../elsewhere\"",
        )
        .unwrap();

        let err = load(None, temp_dir.path()).unwrap_err();
        assert!(err.to_string().contains("cannot contain `..`"));
    }

    #[test]
    fn warns_on_unknown_keys() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("changelog.toml"),
            r#"
experimental = true
commit_types = [{ message = "^add", group = "Added", emoji = "x" }]
"#,
        )
        .unwrap();

        let config = load(None, temp_dir.path()).unwrap();
        assert_eq!(config.warnings.len(), 2);
        assert!(config.warnings[0].contains("experimental"));
        assert!(config.warnings[1].contains("commit_types[0].emoji"));
    }
}

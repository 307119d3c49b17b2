use crate::error::ReleaseError;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::info;

/// Maps a commit message prefix onto a changelog group.
#[derive(Debug, Clone)]
pub struct CommitTypeRule {
    pub group: String,
    pattern: Regex,
}

impl CommitTypeRule {
    pub fn new(message: &str, group: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?i)^(?:{message})\s?[:\-]?\s*")).with_context(|| {
            format!("Commit type message `{message}` is not a valid regular expression.")
        })?;
        Ok(Self {
            group: group.to_string(),
            pattern,
        })
    }

    /// The message with the matched type prefix removed, if the rule applies.
    pub fn strip<'a>(&self, message: &'a str) -> Option<&'a str> {
        let found = self.pattern.find(message)?;
        Some(message[found.end()..].trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub short_hash: String,
    pub message: String,
}

pub fn parse_log(stdout: &str) -> Vec<Commit> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (hash, message) = line
                .split_once(char::is_whitespace)
                .unwrap_or((line, ""));
            Commit {
                short_hash: hash.to_string(),
                message: message.trim().to_string(),
            }
        })
        .collect()
}

/// Rendered entries per group label, each list in commit order.
pub type Classified = BTreeMap<String, Vec<String>>;

pub fn classify(commits: &[Commit], rules: &[CommitTypeRule], commit_link: &str) -> Result<Classified> {
    let mut grouped = Classified::new();

    for commit in commits {
        let Some((rule, cleaned)) = rules
            .iter()
            .find_map(|rule| rule.strip(&commit.message).map(|cleaned| (rule, cleaned)))
        else {
            continue;
        };

        info!(hash = %commit.short_hash, group = %rule.group, "{cleaned}");
        grouped.entry(rule.group.clone()).or_default().push(format!(
            "{cleaned} [{hash}]({commit_link}{hash})",
            hash = commit.short_hash
        ));
    }

    if grouped.is_empty() {
        return Err(ReleaseError::NoConventionalCommits.into());
    }
    Ok(grouped)
}

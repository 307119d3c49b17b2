use crate::conventional::{Classified, CommitTypeRule};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::LazyLock;

pub const CHANGELOG_HEADER: &str = "# Changelog\n\n\
All notable changes to this project will be documented in this file.\n\n";

const FORGE_ADDRESS: &str = "https://github.com/";

static UNRELEASED_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\[unreleased\]:[ \t]*(\S+)\.\.\.(\S+)[ \t]*$")
        .expect("unreleased link pattern is valid")
});

/// Web links into the hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLinks {
    base: String,
}

impl RepositoryLinks {
    pub fn new(space: &str, project: &str) -> Self {
        Self {
            base: format!("{FORGE_ADDRESS}{space}/{project}"),
        }
    }

    pub fn commit(&self) -> String {
        format!("{}/commit/", self.base)
    }

    pub fn compare(&self) -> String {
        format!("{}/compare/", self.base)
    }
}

pub fn render(
    grouped: &Classified,
    rules: &[CommitTypeRule],
    links: &RepositoryLinks,
    next_version: Option<&str>,
    current_version: Option<&str>,
    today: NaiveDate,
) -> String {
    let mut changelog = CHANGELOG_HEADER.to_string();
    match next_version {
        Some(next) => changelog.push_str(&format!("## [{next}] - {today}\n")),
        None => changelog.push_str("## [Unreleased]\n"),
    }

    let mut rendered_groups = BTreeSet::new();
    for rule in rules {
        let Some(entries) = grouped.get(&rule.group) else {
            continue;
        };
        if !rendered_groups.insert(rule.group.as_str()) {
            continue;
        }

        changelog.push_str(&format!("\n### {}\n", rule.group));
        for entry in entries {
            changelog.push_str(&format!("* {entry}\n"));
        }
    }

    let compare = links.compare();
    let footer = match (next_version, current_version) {
        (Some(next), Some(current)) => format!("[{next}]: {compare}{current}...{next}"),
        (None, Some(current)) => format!("[Unreleased]: {compare}{current}...HEAD"),
        _ => format!("[Unreleased]: {compare}???...HEAD"),
    };
    changelog.push_str(&format!("\n{footer}\n"));
    changelog
}

/// The document without the fixed changelog header, used as release notes.
pub fn strip_header(markdown: &str) -> String {
    markdown.replacen(CHANGELOG_HEADER, "", 1)
}

/// Which level-2 heading marks the section being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionMatcher<'a> {
    Version(&'a str),
    Unreleased,
}

impl SectionMatcher<'_> {
    fn matches(&self, heading: &str) -> bool {
        match self {
            Self::Unreleased => heading.to_ascii_lowercase().contains("unreleased"),
            Self::Version(version) => heading.split_whitespace().any(|token| {
                let token = token.trim_matches(|ch: char| matches!(ch, '[' | ']'));
                token.strip_prefix('v').unwrap_or(token) == *version
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedChangelog {
    pub markdown: String,
    pub release_notes: String,
}

fn level_two_heading(line: &str) -> Option<&str> {
    line.strip_prefix("## ").map(str::trim)
}

/// Renames the matching section to `new_version` and returns the renamed
/// section, heading included, as release notes.
/// `None` leaves the caller's document untouched.
pub fn locate_and_replace_unreleased(
    markdown: &str,
    new_version: &str,
    matcher: SectionMatcher<'_>,
    today: NaiveDate,
) -> Option<UpdatedChangelog> {
    let mut offset = 0;
    let mut heading_span = None;
    let mut body_end = markdown.len();

    for line in markdown.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let Some(heading) = level_two_heading(line) else {
            continue;
        };
        match heading_span {
            None if matcher.matches(heading) => heading_span = Some((start, offset)),
            Some(_) => {
                body_end = start;
                break;
            }
            None => {}
        }
    }

    let (heading_start, heading_end) = heading_span?;
    let heading_line = &markdown[heading_start..heading_end];
    let line_ending = if heading_line.ends_with("\r\n") {
        "\r\n"
    } else if heading_line.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let new_heading = format!("## [{new_version}] - {today}{line_ending}");

    let mut updated = String::with_capacity(markdown.len() + 32);
    updated.push_str(&markdown[..heading_start]);
    updated.push_str(&new_heading);
    updated.push_str(&markdown[heading_end..]);

    let mut release_notes = new_heading;
    release_notes.push_str(&markdown[heading_end..body_end]);

    Some(UpdatedChangelog {
        markdown: updated,
        release_notes,
    })
}

/// Points an `[Unreleased]: …/compare/X...HEAD` reference at the new tag.
pub fn rewrite_unreleased_link(text: &str, new_version: &str, new_tag: &str) -> String {
    UNRELEASED_LINK
        .replace_all(text, |caps: &Captures| {
            format!("[{new_version}]: {}...{new_tag}", &caps[1])
        })
        .into_owned()
}

/// Opens an empty `[Unreleased]` section right after the header.
pub fn append_skeleton(
    markdown: &str,
    new_version: &str,
    project: &str,
    tag_prefix: &str,
    space: &str,
) -> String {
    let compare = RepositoryLinks::new(space, project).compare();
    let skeleton = format!(
        "## [Unreleased]\n\n[Unreleased]: {compare}{tag_prefix}{new_version}...HEAD\n\n"
    );

    let mut offset = 0;
    for line in markdown.split_inclusive('\n') {
        if level_two_heading(line).is_some() {
            let mut updated = String::with_capacity(markdown.len() + skeleton.len());
            updated.push_str(&markdown[..offset]);
            updated.push_str(&skeleton);
            updated.push_str(&markdown[offset..]);
            return updated;
        }
        offset += line.len();
    }

    let mut updated = markdown.to_string();
    if !updated.is_empty() && !updated.ends_with("\n\n") {
        updated.push_str(if updated.ends_with('\n') { "\n" } else { "\n\n" });
    }
    updated.push_str(&skeleton);
    updated
}

use thiserror::Error;

/// Failure kinds the release commands distinguish. Everything is carried
/// through `anyhow` and can be recovered with `downcast_ref`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("`{version}` is not a valid version: {reason}")]
    VersionParse { version: String, reason: String },

    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    #[error("No project definition file found in `{0}`.")]
    ConfigurationMissing(String),

    #[error("Git tag `{0}` is already taken.")]
    TagCollision(String),

    #[error("No conventional commits found.")]
    NoConventionalCommits,

    #[error("No unreleased section found in `{0}`.")]
    ChangelogSectionNotFound(String),

    #[error("Command `{command}` failed (exit {status}): {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("HTTP request to {url} failed with status {status}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Token is missing. Set `{0}` to create or upload release assets.")]
    MissingToken(String),

    #[error("Version `{current}` is ahead of the calendar version `{slot}`.")]
    CalendarVersionAhead { current: String, slot: String },
}

impl ReleaseError {
    pub fn version_parse(version: impl Into<String>, reason: impl Into<String>) -> Self {
        ReleaseError::VersionParse {
            version: version.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = ReleaseError::TagCollision("v1.0.0".to_string());
        assert_eq!(err.to_string(), "Git tag `v1.0.0` is already taken.");

        let err = ReleaseError::version_parse("1.x", "invalid minor");
        assert!(err.to_string().contains("`1.x`"));
        assert!(err.to_string().contains("invalid minor"));
    }

    #[test]
    fn command_failure_keeps_stderr() {
        let err = ReleaseError::CommandFailed {
            command: "git push".to_string(),
            status: 128,
            stderr: "fatal: no remote".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git push"));
        assert!(msg.contains("128"));
        assert!(msg.contains("fatal: no remote"));
    }

    #[test]
    fn converts_into_anyhow_and_back() {
        let err: anyhow::Error = ReleaseError::NoConventionalCommits.into();
        assert_eq!(
            err.downcast_ref::<ReleaseError>(),
            Some(&ReleaseError::NoConventionalCommits)
        );
    }
}

use console::style;

/// Operator-facing output. Passed into every command instead of writing to
/// the terminal directly so tests can capture it.
pub trait Reporter {
    fn info(&mut self, message: &str);
    fn ok(&mut self, message: &str);
    fn warning(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn info(&mut self, message: &str) {
        println!("{} {message}", style("ℹ").cyan());
    }

    fn ok(&mut self, message: &str) {
        println!("{} {message}", style("✓").green());
    }

    fn warning(&mut self, message: &str) {
        eprintln!("{} {message}", style("⚠").yellow());
    }

    fn error(&mut self, message: &str) {
        eprintln!("{} {message}", style("✗").red().bold());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Reporter;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Level {
        Info,
        Ok,
        Warning,
        Error,
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        pub lines: Vec<(Level, String)>,
    }

    impl RecordingReporter {
        pub fn contains(&self, level: Level, needle: &str) -> bool {
            self.lines
                .iter()
                .any(|(line_level, line)| *line_level == level && line.contains(needle))
        }
    }

    impl Reporter for RecordingReporter {
        fn info(&mut self, message: &str) {
            self.lines.push((Level::Info, message.to_string()));
        }

        fn ok(&mut self, message: &str) {
            self.lines.push((Level::Ok, message.to_string()));
        }

        fn warning(&mut self, message: &str) {
            self.lines.push((Level::Warning, message.to_string()));
        }

        fn error(&mut self, message: &str) {
            self.lines.push((Level::Error, message.to_string()));
        }
    }
}

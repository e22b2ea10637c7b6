//! Terminal/CI environment detection

use std::io::IsTerminal;

/// Environment variables that identify a CI runner
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Decides between fancy terminal output and plain CI log lines
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    ci: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        let ci = CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        let tty = std::io::stdout().is_terminal();
        Self {
            interactive: tty && !ci,
            ci,
        }
    }

    /// A context that always uses plain output (tests, explicit CI mode)
    pub fn plain() -> Self {
        Self {
            interactive: false,
            ci: true,
        }
    }

    /// Whether we are running under a CI service
    pub fn is_ci(&self) -> bool {
        self.ci
    }

    /// Whether spinners and progress bars should be drawn
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_context() {
        let ctx = UiContext::plain();
        assert!(!ctx.use_fancy_output());
        assert!(ctx.is_ci());
    }
}

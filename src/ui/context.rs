//! Terminal detection for prompts, colors and progress bars

use std::io::IsTerminal;

/// Environment variables set by common CI systems
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// How the binary talks to the user
#[derive(Debug, Clone)]
pub struct UiContext {
    /// stdin and stdout are terminals and no CI marker is set
    interactive: bool,
    /// `--yes` was passed
    auto_yes: bool,
    /// stderr is a terminal, so indicatif can draw
    progress: bool,
}

impl UiContext {
    /// Inspect the current process
    pub fn detect() -> Self {
        let ci = CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        let interactive =
            !ci && std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        Self {
            interactive,
            auto_yes: false,
            progress: !ci && std::io::stderr().is_terminal(),
        }
    }

    /// Plain output, no prompts, no progress bars
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
            progress: false,
        }
    }

    /// Approve every confirmation prompt
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Use cliclack-styled log lines instead of bracketed prefixes
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Draw transfer progress bars
    pub fn show_progress(&self) -> bool {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_context() {
        let ctx = UiContext::non_interactive();
        assert!(!ctx.is_interactive());
        assert!(!ctx.auto_yes());
        assert!(!ctx.show_progress());
    }

    #[test]
    fn with_auto_yes() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(ctx.auto_yes());
    }
}

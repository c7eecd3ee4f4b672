//! Prompt recognizers for the interactive login.

use regex::Regex;
use tracing::error;

const USERNAME: &[&str] = &["[Uu]sername", "enter username", "Enter username"];
const PASSWORD: &[&str] = &["[Pp]assword", "enter password", "Enter password"];
const SECOND_FACTOR: &[&str] = &[
    "Enter the code from your authenticator",
    "Enter the security code",
    "Enter the code sent to your email",
    "2FA code",
    "Two-Factor Code",
];
const FAILURE: &[&str] = &[
    r"(?i)login failed",
    r"(?i)invalid (?:username|password|credentials|code)",
    r"(?i)incorrect (?:username|password|code)",
];

/// Regex lists matched against the tool's output at each step.
#[derive(Debug, Clone)]
pub struct LoginPrompts {
    pub username: Vec<Regex>,
    pub password: Vec<Regex>,
    pub second_factor: Vec<Regex>,
    pub failure: Vec<Regex>,
}

impl LoginPrompts {
    /// Builds a prompt set from pattern strings.
    pub fn new(
        username: &[&str],
        password: &[&str],
        second_factor: &[&str],
        failure: &[&str],
    ) -> Result<Self, regex::Error> {
        let build = |patterns: &[&str]| -> Result<Vec<Regex>, regex::Error> {
            patterns.iter().map(|p| Regex::new(p)).collect()
        };
        Ok(Self {
            username: build(username)?,
            password: build(password)?,
            second_factor: build(second_factor)?,
            failure: build(failure)?,
        })
    }
}

impl Default for LoginPrompts {
    fn default() -> Self {
        match Self::new(USERNAME, PASSWORD, SECOND_FACTOR, FAILURE) {
            Ok(prompts) => prompts,
            Err(e) => {
                error!(error = %e, "built-in login prompt failed to compile");
                Self {
                    username: Vec::new(),
                    password: Vec::new(),
                    second_factor: Vec::new(),
                    failure: Vec::new(),
                }
            }
        }
    }
}

/// Earliest match of any pattern in `text`: (pattern index, start, end).
pub(crate) fn earliest(patterns: &[Regex], text: &str) -> Option<(usize, usize, usize)> {
    patterns
        .iter()
        .enumerate()
        .filter_map(|(i, re)| re.find(text).map(|m| (i, m.start(), m.end())))
        .min_by_key(|&(_, start, _)| start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_recognize_gogrepo_prompts() {
        let p = LoginPrompts::default();
        assert!(earliest(&p.username, "enter username: ").is_some());
        assert!(earliest(&p.password, "Password: ").is_some());
        assert!(earliest(&p.second_factor, "Enter the security code: ").is_some());
        assert!(earliest(&p.second_factor, "2FA code: ").is_some());
        assert!(earliest(&p.failure, "ERROR: Login failed").is_some());
        assert!(earliest(&p.failure, "fetching game list").is_none());
    }

    #[test]
    fn earliest_prefers_first_position() {
        let p = LoginPrompts::new(&["b"], &["a"], &[], &[]).unwrap();
        let mut all = p.username.clone();
        all.extend(p.password.clone());
        assert_eq!(earliest(&all, "xxab"), Some((1, 2, 3)));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(LoginPrompts::new(&["("], &[], &[], &[]).is_err());
    }
}

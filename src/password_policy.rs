use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};:'\",.<>/?\\|";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("password must be at least {0} characters long")]
    TooShort(usize),

    #[error("password must contain at least one uppercase letter")]
    MissingUppercase,

    #[error("password must contain at least one lowercase letter")]
    MissingLowercase,

    #[error("password must contain at least one digit")]
    MissingDigit,

    #[error("password must contain at least one special character")]
    MissingSpecial,

    #[error("password must use at least {0} distinct characters")]
    TooFewDistinctChars(usize),

    #[error("password must not contain {0} or more sequential digits")]
    SequentialDigits(usize),

    #[error("password must not contain {0} or more sequential letters")]
    SequentialLetters(usize),
}

/// Password strength rules applied when a password is set or reset.
///
/// Serializes to a description of itself so clients can render the rules.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    pub min_distinct_chars: usize,
    pub max_sequential_chars: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            min_distinct_chars: 4,
            max_sequential_chars: 3,
        }
    }
}

impl PasswordPolicy {
    /// Checks `password` against every rule and reports all violations at once.
    pub fn validate(&self, password: &str) -> Result<(), Vec<PolicyViolation>> {
        let chars: Vec<char> = password.chars().collect();
        let mut violations = Vec::new();

        if chars.len() < self.min_length {
            violations.push(PolicyViolation::TooShort(self.min_length));
        }
        if self.require_uppercase && !chars.iter().any(|c| c.is_uppercase()) {
            violations.push(PolicyViolation::MissingUppercase);
        }
        if self.require_lowercase && !chars.iter().any(|c| c.is_lowercase()) {
            violations.push(PolicyViolation::MissingLowercase);
        }
        if self.require_digit && !chars.iter().any(|c| c.is_numeric()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if self.require_special && !chars.iter().any(|c| SPECIAL_CHARS.contains(*c)) {
            violations.push(PolicyViolation::MissingSpecial);
        }
        if chars.iter().collect::<HashSet<_>>().len() < self.min_distinct_chars {
            violations.push(PolicyViolation::TooFewDistinctChars(self.min_distinct_chars));
        }
        if let Some(violation) = self.first_sequential_run(&chars) {
            violations.push(violation);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    // only the first offending run is reported
    fn first_sequential_run(&self, chars: &[char]) -> Option<PolicyViolation> {
        let n = self.max_sequential_chars;
        if n < 2 {
            return None;
        }

        for window in chars.windows(n) {
            // runs are only meaningful for 0-9, other numerals don't count
            if window.iter().all(|c| c.is_ascii_digit()) && is_sequential(window) {
                return Some(PolicyViolation::SequentialDigits(n));
            }
            if window.iter().all(|c| c.is_alphabetic()) {
                let lowered: Vec<char> = window
                    .iter()
                    .map(|c| c.to_lowercase().next().unwrap_or(*c))
                    .collect();
                if is_sequential(&lowered) {
                    return Some(PolicyViolation::SequentialLetters(n));
                }
            }
        }
        None
    }
}

// strictly ascending or descending by one code point ("abc", "321")
fn is_sequential(window: &[char]) -> bool {
    let steps: Vec<i64> = window
        .windows(2)
        .map(|pair| pair[1] as i64 - pair[0] as i64)
        .collect();
    steps.iter().all(|&d| d == 1) || steps.iter().all(|&d| d == -1)
}

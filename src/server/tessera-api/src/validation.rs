//! Request validation.

use regex::Regex;

use crate::ApiError;

const USERNAME_MIN: usize = 2;
const USERNAME_MAX: usize = 100;
const CODE_LENGTH: usize = 6;
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Password rules.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Minimum length in characters.
    pub min_length: usize,
    /// Maximum length in characters.
    pub max_length: usize,
    /// Patterns the password must all match.
    pub patterns: Vec<Regex>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 100,
            patterns: Vec::new(),
        }
    }
}

impl PasswordPolicy {
    /// Builds a policy, compiling `patterns`.
    pub fn new(min_length: usize, max_length: usize, patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            min_length,
            max_length,
            patterns,
        })
    }
}

/// Validates request fields before they reach the service.
#[derive(Debug, Clone)]
pub struct Validator {
    password: PasswordPolicy,
    email: Regex,
}

impl Validator {
    /// Creates a validator with the given password policy.
    pub fn new(password: PasswordPolicy) -> Self {
        Self {
            password,
            email: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
        }
    }

    /// Required, 2 to 100 characters.
    pub fn username(&self, username: &str) -> Result<(), ApiError> {
        let len = username.chars().count();
        if len == 0 {
            return Err(ApiError::Validation("username is required".into()));
        }
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
            return Err(ApiError::Validation(format!(
                "username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
            )));
        }
        Ok(())
    }

    /// Required, well-formed address.
    pub fn email(&self, email: &str) -> Result<(), ApiError> {
        if email.is_empty() {
            return Err(ApiError::Validation("email is required".into()));
        }
        if !self.email.is_match(email) {
            return Err(ApiError::Validation("email must be a valid email address".into()));
        }
        Ok(())
    }

    /// Required, within the policy's length bounds and matching every pattern.
    pub fn password(&self, password: &str) -> Result<(), ApiError> {
        let len = password.chars().count();
        if len == 0 {
            return Err(ApiError::Validation("password is required".into()));
        }
        if len < self.password.min_length || len > self.password.max_length {
            return Err(ApiError::Validation(format!(
                "password must be between {} and {} characters",
                self.password.min_length, self.password.max_length
            )));
        }
        if let Some(pattern) = self.password.patterns.iter().find(|p| !p.is_match(password)) {
            return Err(ApiError::Validation(format!(
                "password must match {}",
                pattern.as_str()
            )));
        }
        Ok(())
    }

    /// Exactly six ASCII digits.
    pub fn code(&self, code: &str) -> Result<(), ApiError> {
        if code.is_empty() {
            return Err(ApiError::Validation("code is required".into()));
        }
        if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ApiError::Validation(format!(
                "code must be {CODE_LENGTH} digits"
            )));
        }
        Ok(())
    }

    /// Required.
    pub fn token(&self, token: &str) -> Result<(), ApiError> {
        if token.trim().is_empty() {
            return Err(ApiError::Validation("token is required".into()));
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(PasswordPolicy::default())
    }
}

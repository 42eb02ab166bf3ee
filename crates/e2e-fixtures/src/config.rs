use crate::client::TestDataClient;
use crate::Result;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Where the login form lives and how to drive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub path: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Upper bound on waiting for the post-login redirect.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            path: "/login".to_string(),
            email_selector: r#"input[name="email"]"#.to_string(),
            password_selector: r#"input[name="password"]"#.to_string(),
            submit_selector: r#"button[type="submit"]"#.to_string(),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct E2eConfig {
    pub base_url: String,
    pub login: LoginForm,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login: LoginForm::default(),
        }
    }
}

impl E2eConfig {
    /// `E2E_BASE_URL`, then `APP_URL`, then `http://localhost:8000`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = ["E2E_BASE_URL", "APP_URL"]
            .iter()
            .filter_map(|&key| lookup(key))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            ..Self::default()
        }
    }

    pub fn client(&self) -> Result<TestDataClient> {
        TestDataClient::new(&self.base_url)
    }
}

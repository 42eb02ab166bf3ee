//! Disposable test data for browser-driven end-to-end tests.
//!
//! Each fixture owns one backend-side user created through the test-only
//! `/e2e/users` endpoints and deletes it when the test body finishes, whether
//! the body returned `Ok`, returned `Err`, or panicked.
//!
//! ```text
//! TestDataClient ── POST /e2e/users ──▶ TestUser
//!      │                                   │
//!      │                     login(page) ──┤  (goto /login, fill, submit,
//!      │                                   │   wait until URL leaves /login)
//!      │                                   ▼
//!      │                          AuthenticatedPage { page, user, console }
//!      │                                   │
//!      └── DELETE /e2e/users/{id} ◀── test body done
//! ```
//!
//! The browser itself sits behind the [`Page`] trait so any driver can be
//! plugged in.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use e2e_fixtures::{with_authenticated_page, E2eConfig};
//!
//! let config = E2eConfig::from_env();
//! let client = config.client()?;
//! with_authenticated_page(&client, page, &config.login, |session| async move {
//!     session.page.goto(&format!("{}/users", client.base_url())).await?;
//!     session.console.assert_no_errors(&[])?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod fixture;
pub mod page;
pub mod user;

pub use client::TestDataClient;
pub use config::{E2eConfig, LoginForm};
pub use console::{ConsoleCollector, ConsoleKind, ConsoleMessage, IgnorePattern, SourceLocation};
pub use error::FixtureError;
pub use fixture::{login, with_authenticated_page, with_user, AuthenticatedPage};
pub use page::{ConsoleSink, Page};
pub use user::{DeleteResponse, NewUser, TestUser};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, FixtureError>;

//! Scoped fixtures.
//!
//! Every fixture creates its own user, hands it to the test body and deletes
//! it afterwards. Deletion runs when the body returns `Ok`, returns `Err` or
//! panics; a panic is resumed once the user is gone.

use crate::client::TestDataClient;
use crate::config::LoginForm;
use crate::console::ConsoleCollector;
use crate::error::FixtureError;
use crate::page::Page;
use crate::user::{DeleteResponse, NewUser, TestUser};
use crate::Result;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// A page that has logged in as `user`, with its console being recorded.
pub struct AuthenticatedPage<P> {
    pub page: P,
    pub user: TestUser,
    pub console: ConsoleCollector,
}

/// Create a user from `new_user`, run `body`, delete the user.
pub async fn with_user<F, Fut, T, E>(
    client: &TestDataClient,
    new_user: NewUser,
    body: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(TestUser) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<FixtureError>,
{
    let user = client.create_user(&new_user).await?;
    let id = user.id;

    let outcome = AssertUnwindSafe(async move { body(user).await })
        .catch_unwind()
        .await;
    let cleanup = client.delete_user(id).await;
    finish(id, outcome, cleanup)
}

/// Create a fresh user, log `page` in as that user, run `body`, delete the user.
///
/// Login happens inside the cleanup scope: if it fails the user is deleted
/// before the login error is returned.
pub async fn with_authenticated_page<P, F, Fut, T, E>(
    client: &TestDataClient,
    page: P,
    form: &LoginForm,
    body: F,
) -> std::result::Result<T, E>
where
    P: Page,
    F: FnOnce(AuthenticatedPage<P>) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<FixtureError>,
{
    let user = client.create_user(&NewUser::default()).await?;
    let id = user.id;

    let outcome = AssertUnwindSafe(login_then(client.base_url(), page, user, form, body))
        .catch_unwind()
        .await;
    let cleanup = client.delete_user(id).await;
    finish(id, outcome, cleanup)
}

async fn login_then<P, F, Fut, T, E>(
    base_url: &str,
    page: P,
    user: TestUser,
    form: &LoginForm,
    body: F,
) -> std::result::Result<T, E>
where
    P: Page,
    F: FnOnce(AuthenticatedPage<P>) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<FixtureError>,
{
    let console = ConsoleCollector::new();
    console.attach(&page);
    login(&page, base_url, &user, form).await?;
    body(AuthenticatedPage {
        page,
        user,
        console,
    })
    .await
}

/// Drive the login form and wait for the redirect away from it.
pub async fn login<P: Page + ?Sized>(
    page: &P,
    base_url: &str,
    user: &TestUser,
    form: &LoginForm,
) -> Result<()> {
    page.goto(&format!("{}{}", base_url.trim_end_matches('/'), form.path))
        .await?;
    page.fill(&form.email_selector, &user.email).await?;
    page.fill(&form.password_selector, &user.password).await?;
    page.click(&form.submit_selector).await?;

    match tokio::time::timeout(form.timeout, wait_for_redirect(page, form)).await {
        Ok(Ok(url)) => {
            tracing::debug!(email = %user.email, %url, "logged in");
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let url = page.current_url().await.unwrap_or_default();
            Err(FixtureError::LoginTimeout {
                login_path: form.path.clone(),
                url,
                timeout_ms: u64::try_from(form.timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

async fn wait_for_redirect<P: Page + ?Sized>(page: &P, form: &LoginForm) -> Result<String> {
    loop {
        let url = page.current_url().await?;
        if !on_login_page(&url, &form.path) {
            return Ok(url);
        }
        tokio::time::sleep(form.poll_interval).await;
    }
}

/// Whether `url` is the login route or a page beneath it. `/admin/login-history`
/// and `/loginx` are not.
fn on_login_page(url: &str, login_path: &str) -> bool {
    let path = url_path(url);
    let login_path = login_path.trim_end_matches('/');
    path == login_path || path.starts_with(&format!("{login_path}/"))
}

fn url_path(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn finish<T, E>(
    user_id: u64,
    outcome: std::thread::Result<std::result::Result<T, E>>,
    cleanup: Result<DeleteResponse>,
) -> std::result::Result<T, E>
where
    E: From<FixtureError>,
{
    match outcome {
        Ok(Ok(value)) => {
            cleanup?;
            Ok(value)
        }
        Ok(Err(e)) => {
            if let Err(cleanup_err) = cleanup {
                tracing::warn!(user_id, error = %cleanup_err, "failed to delete test user");
            }
            Err(e)
        }
        Err(panic) => {
            if let Err(cleanup_err) = cleanup {
                tracing::warn!(user_id, error = %cleanup_err, "failed to delete test user");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

use crate::error::FixtureError;
use crate::user::{DeleteResponse, NewUser, TestUser};
use crate::Result;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USERS_PATH: &str = "/e2e/users";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the backend's test-only user endpoints.
#[derive(Debug, Clone)]
pub struct TestDataClient {
    base_url: String,
    http: Client,
}

impl TestDataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(base_url, http)
    }

    /// Use a preconfigured `reqwest::Client` (custom TLS roots, proxies, ...).
    pub fn with_client(base_url: &str, http: Client) -> Result<Self> {
        reqwest::Url::parse(base_url).map_err(|e| FixtureError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /e2e/users`. Fields left out of `new_user` are generated by the backend.
    pub async fn create_user(&self, new_user: &NewUser) -> Result<TestUser> {
        let response = self
            .http
            .post(format!("{}{USERS_PATH}", self.base_url))
            .header(ACCEPT, "application/json")
            .json(new_user)
            .send()
            .await?;
        let user: TestUser = decode("POST", USERS_PATH.to_string(), response).await?;
        tracing::debug!(id = user.id, email = %user.email, "created test user");
        Ok(user)
    }

    /// `DELETE /e2e/users/{id}`.
    pub async fn delete_user(&self, id: u64) -> Result<DeleteResponse> {
        let path = format!("{USERS_PATH}/{id}");
        let response = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let deleted = decode("DELETE", path, response).await?;
        tracing::debug!(id, "deleted test user");
        Ok(deleted)
    }
}

async fn decode<T: DeserializeOwned>(
    method: &'static str,
    path: String,
    response: Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FixtureError::Request {
            method,
            path,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use e2e_fixtures::{ConsoleKind, ConsoleMessage, ConsoleSink, FixtureError, NewUser, Page, TestUser};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Stub backend serving /e2e/users
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Backend {
    store: Arc<Mutex<Store>>,
}

#[derive(Default)]
struct Store {
    next_id: u64,
    users: BTreeMap<u64, TestUser>,
}

impl Backend {
    pub fn contains(&self, id: u64) -> bool {
        self.store.lock().unwrap().users.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().users.len()
    }
}

type ApiError = (StatusCode, Json<Value>);

async fn create_user(
    State(backend): State<Backend>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<TestUser>), ApiError> {
    let mut store = backend.store.lock().unwrap();
    let email = req
        .email
        .unwrap_or_else(|| format!("e2e-{}@example.com", uuid::Uuid::new_v4()));
    if store.users.values().any(|u| u.email == email) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "The email has already been taken.",
                "errors": { "email": ["The email has already been taken."] }
            })),
        ));
    }
    store.next_id += 1;
    let user = TestUser {
        id: store.next_id,
        email,
        name: req.name.unwrap_or_else(|| "E2E User".to_string()),
        password: "password".to_string(),
    };
    store.users.insert(user.id, user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

async fn delete_user(
    State(backend): State<Backend>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    match backend.store.lock().unwrap().users.remove(&id) {
        Some(_) => Ok(Json(json!({ "message": "User deleted successfully" }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "User not found" })),
        )),
    }
}

/// Serve the stub on an ephemeral port; returns its base URL.
pub async fn spawn_backend() -> (String, Backend) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/e2e/users", post(create_user))
        .route("/e2e/users/{id}", delete(delete_user))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), backend)
}

// ---------------------------------------------------------------------------
// FakePage
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginBehavior {
    /// Redirect to /dashboard when the password is "password".
    Accept,
    /// Never leave the login page.
    StayOnLogin,
    /// `fill` on this selector fails.
    MissingSelector(String),
}

/// In-memory stand-in for a browser page. Clones share state.
#[derive(Clone)]
pub struct FakePage {
    behavior: LoginBehavior,
    state: Arc<Mutex<PageState>>,
}

#[derive(Default)]
struct PageState {
    url: String,
    fields: HashMap<String, String>,
    visits: Vec<String>,
    sinks: Vec<ConsoleSink>,
}

impl FakePage {
    pub fn new(behavior: LoginBehavior) -> Self {
        Self {
            behavior,
            state: Arc::new(Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..PageState::default()
            })),
        }
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().unwrap().visits.clone()
    }

    pub fn field(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().fields.get(selector).cloned()
    }

    /// Report a console message the way a browser driver does, by type name.
    pub fn emit(&self, driver_type: &str, text: &str) {
        let sinks = self.state.lock().unwrap().sinks.clone();
        for sink in sinks {
            sink(ConsoleMessage::new(ConsoleKind::parse(driver_type), text));
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> e2e_fixtures::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.visits.push(url.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> e2e_fixtures::Result<()> {
        if self.behavior == LoginBehavior::MissingSelector(selector.to_string()) {
            return Err(FixtureError::Browser(format!(
                "no element matches selector {selector}"
            )));
        }
        self.state
            .lock()
            .unwrap()
            .fields
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, _selector: &str) -> e2e_fixtures::Result<()> {
        let accepted = {
            let mut state = self.state.lock().unwrap();
            let password_ok = state
                .fields
                .get(r#"input[name="password"]"#)
                .is_some_and(|p| p == "password");
            if self.behavior == LoginBehavior::Accept && password_ok {
                state.url = state.url.replace("/login", "/dashboard");
                true
            } else {
                false
            }
        };
        if accepted {
            self.emit("log", "dashboard mounted");
        }
        Ok(())
    }

    async fn current_url(&self) -> e2e_fixtures::Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    fn on_console(&self, sink: ConsoleSink) {
        self.state.lock().unwrap().sinks.push(sink);
    }
}

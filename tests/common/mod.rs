#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tokio::net::TcpListener;
use xapi_lrs::{AppState, app, config::Settings, storage::models::StoredToken};

pub const XAPI_VERSION: &str = "1.0.3";
pub const VERSION_HEADER: &str = "X-Experience-API-Version";

pub struct TestApp {
    pub address: String,
    pub state: AppState,
    pub client: reqwest::Client,
    /// Bearer token holding `super`.
    pub admin_token: String,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Settings::for_tests()).await
}

pub async fn spawn_app_with(mut settings: Settings) -> TestApp {
    // Bind to port 0 to let the OS assign a random available port.
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);
    settings.base_url = address.clone();

    let state = AppState::new(settings)
        .await
        .expect("Failed to build application state");
    let router = app(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut app = TestApp {
        address,
        state,
        client: reqwest::Client::new(),
        admin_token: String::new(),
    };
    app.admin_token = app.create_token("admin", &["super"]).await;
    app
}

impl TestApp {
    /// Seeds a bearer token straight into the token store.
    pub async fn create_token(&self, user_id: &str, permissions: &[&str]) -> String {
        self.store_token(StoredToken {
            token: String::new(),
            key: None,
            secret: None,
            user_id: user_id.to_string(),
            name: Some(format!("{user_id} client")),
            email: Some(format!("{user_id}@lrs.example.com")),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            expires_at: None,
            expired: false,
            code: None,
        })
        .await
        .token
    }

    pub async fn store_token(&self, token: StoredToken) -> StoredToken {
        self.state
            .tokens()
            .store_token(token)
            .await
            .expect("Failed to store token")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Request carrying the version header and a bearer token.
    pub fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .header(VERSION_HEADER, XAPI_VERSION)
    }

    pub async fn post_statements(&self, token: &str, body: &Value) -> Response {
        self.request(Method::POST, "/statements", token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// POST under an explicit protocol version.
    pub async fn post_statements_as(&self, version: &str, body: &Value) -> Response {
        self.client
            .post(self.url("/statements"))
            .bearer_auth(&self.admin_token)
            .header(VERSION_HEADER, version)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_statements(&self, token: &str, query: &[(&str, &str)]) -> Response {
        self.request(Method::GET, "/statements", token)
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Follows a relative `more` link.
    pub async fn get_more(&self, token: &str, more: &str) -> Response {
        self.request(Method::GET, more, token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Posts statements as the admin and returns their ids.
    pub async fn insert(&self, body: &Value) -> Vec<String> {
        let response = self.post_statements(&self.admin_token, body).await;
        let ids = json_body(assert_status(response, 200).await).await;
        serde_json::from_value(ids).expect("POST /statements should return an id array")
    }
}

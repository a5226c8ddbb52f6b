pub mod activities;
pub mod agents;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod documents;
pub mod errors;
pub mod middleware;
pub mod statements;
pub mod storage;
pub mod xapi;

use crate::{
    activities::handlers::get_activity_handler,
    agents::handlers::get_agents_handler,
    attachments::handlers::get_attachment_handler,
    auth::{PermissionTable, TokenStore},
    config::{ATTACHMENTS_PATH, Settings, storage_config},
    documents::handlers::{
        delete_profile_handler, delete_state_handler, get_profile_handler, get_state_handler,
        post_profile_handler, post_state_handler, put_profile_handler, put_state_handler,
    },
    middleware::{
        ABOUT_PATH, alternate_request_syntax, auth_middleware, cors_layer, xapi_headers,
    },
    statements::handlers::{
        STATEMENTS_PATH, delete_statement_handler, get_statements_handler,
        post_statements_handler, put_statement_handler,
    },
    storage::Storage,
    xapi::SUPPORTED_VERSIONS,
};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub permissions: Arc<PermissionTable>,
    pub storage: Arc<Storage>,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let storage = storage_config(&settings).await?;
        Ok(Self {
            settings: Arc::new(settings),
            permissions: Arc::new(PermissionTable::default()),
            storage: Arc::new(storage),
        })
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.storage.documents.clone())
    }
}

pub fn app(app_state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            STATEMENTS_PATH,
            get(get_statements_handler)
                .post(post_statements_handler)
                .put(put_statement_handler)
                .delete(delete_statement_handler),
        )
        .route("/activities", get(get_activity_handler))
        .route(
            "/activities/state",
            get(get_state_handler)
                .put(put_state_handler)
                .post(post_state_handler)
                .delete(delete_state_handler),
        )
        .route("/agents", get(get_agents_handler))
        .route(
            "/agents/profile",
            get(get_profile_handler)
                .put(put_profile_handler)
                .post(post_profile_handler)
                .delete(delete_profile_handler),
        )
        .route(ATTACHMENTS_PATH, get(get_attachment_handler))
        .route_layer(from_fn_with_state(app_state.clone(), auth_middleware));

    let routes = Router::new()
        .route(ABOUT_PATH, get(about_handler))
        .merge(protected_routes)
        .layer(from_fn_with_state(app_state.clone(), xapi_headers))
        .with_state(app_state);

    // Layers on the outer router run before the inner one routes.
    Router::new()
        .fallback_service(routes)
        .layer(from_fn(alternate_request_syntax))
        .layer(cors_layer())
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;
    let addr: SocketAddr = format!("{}:{}", settings.listen_addr, settings.port).parse()?;
    let app_state = AppState::new(settings).await?;
    let app = app(app_state);

    info!("Server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn about_handler() -> Json<Value> {
    Json(json!({ "version": SUPPORTED_VERSIONS }))
}

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::InboundError;
use crate::provider::openai::OpenAiChatProvider;
use crate::provider::vertex::VertexPredictionProvider;
use crate::provider::Providers;
use crate::service::relay::ConversationRelay;
use crate::session::{shared, MemoryConversationStore, UserLocks};
use crate::twiml::{self, MessagingResponse};

pub const INVALID_SOURCE_REPLY: &str = "Fonte inválida";

/// Shared application state for the webhook server.
pub struct AppState {
    pub relay: ConversationRelay,
}

impl AppState {
    pub fn new(relay: ConversationRelay) -> Self {
        Self { relay }
    }

    /// Build the production wiring: both HTTP backends and an empty
    /// in-memory store.
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let chat = Arc::new(OpenAiChatProvider::from_config(&config.openai));
        let predict = Arc::new(VertexPredictionProvider::from_config(&config.vertex)?);
        if config.vertex.endpoint_id.is_none() {
            warn!("VERTEX_ENDPOINT_ID is not set; visual requests will get the fallback reply");
        }

        let relay = ConversationRelay::new(
            shared(MemoryConversationStore::new()),
            Arc::new(UserLocks::new()),
            Providers::new(chat, predict),
            config.server.backend_timeout(),
        );
        Ok(Self::new(relay))
    }
}

/// Form fields posted by the messaging provider. Anything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub conversations: usize,
}

/// Create the axum Router with the webhook and health routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /webhook: inbound message from the messaging provider
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Form(msg): Form<InboundMessage>,
) -> Response {
    match state.relay.handle(&msg.from, &msg.body).await {
        Ok(reply) => {
            let xml = MessagingResponse::new().message(&reply.text).render();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, twiml::CONTENT_TYPE)],
                xml,
            )
                .into_response()
        }
        Err(InboundError::InvalidSource(from)) => {
            warn!("Rejected message from non-channel sender {:?}", from);
            (StatusCode::BAD_REQUEST, INVALID_SOURCE_REPLY).into_response()
        }
    }
}

/// GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conversations = state.relay.store().lock().await.len();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        conversations,
    })
}

/// Start the HTTP server on the given address and run until `shutdown` fires.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Webhook server stopped");
    Ok(())
}

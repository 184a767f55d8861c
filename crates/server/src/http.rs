//! Adaptador HTTP: `POST /` com `{"command": "..."}`.

use axum::{Json, Router, body::Bytes, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;

use gustdb_protocol::Reply;
use gustdb_storage::Db;

use crate::execute_line;

/// Corpo da requisição.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// O comando como texto, ex.: "SET key value"
    pub command: String,
}

/// Corpo da resposta: `{}`, `{"value": ...}` ou `{"error": ...}`.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(message.into()),
        }
    }
}

/// Monta o router com o store injetado como estado.
pub fn router(db: Db) -> Router {
    Router::new()
        .route("/", post(command_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

/// O corpo é decodificado direto dos bytes: clientes que não mandam
/// `Content-Type: application/json` também são aceitos.
async fn command_handler(State(db): State<Db>, body: Bytes) -> (StatusCode, Json<CommandResponse>) {
    let req = match serde_json::from_slice::<CommandRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!("requisição rejeitada: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(CommandResponse::error("invalid request")),
            );
        }
    };

    match execute_line(&req.command, &db).await {
        Ok(Reply::Ok) => (StatusCode::OK, Json(CommandResponse::default())),
        Ok(Reply::Value(value)) => (
            StatusCode::OK,
            Json(CommandResponse {
                value: Some(value),
                error: None,
            }),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, Json(CommandResponse::error(e.to_string()))),
    }
}

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use hal_gateway::connection;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// GET /gateway. A valid `?token=` skips the Identify handshake; anything
/// else falls back to it.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(q): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ctx = state.gateway_context();
    let identity = match q.token.as_deref() {
        Some(token) => connection::authenticate(state.db.clone(), &state.jwt_secret, token).await,
        None => None,
    };
    if q.token.is_some() && identity.is_none() {
        debug!("Gateway token rejected at upgrade, waiting for Identify");
    }

    ws.on_upgrade(move |socket| async move {
        match identity {
            Some((user_id, name)) => connection::handle_connection_authenticated(socket, ctx, user_id, name).await,
            None => connection::handle_connection(socket, ctx).await,
        }
    })
}

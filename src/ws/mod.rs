pub mod handlers;
mod operator;
mod team;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, Audience};
use crate::types::{PlayerId, Role, TeamId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
}

/// Per-connection context: the declared role plus, for team devices, the
/// identity established by create/join/rejoin on this connection.
#[derive(Debug)]
pub struct ConnCtx {
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub player_id: Option<PlayerId>,
}

impl ConnCtx {
    pub fn new(role: Role) -> Self {
        Self { role, team_id: None, player_id: None }
    }

    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.team_id.as_deref()?, self.player_id.as_deref()?))
    }

    /// Broadcast filter: does a message with this audience reach us?
    pub fn wants(&self, audience: &Audience) -> bool {
        match audience {
            Audience::All => true,
            Audience::Operator => self.role == Role::Operator,
            Audience::Team(team_id) => self.team_id.as_deref() == Some(team_id),
            Audience::TeamOthers { team_id, except } => {
                self.team_id.as_deref() == Some(team_id)
                    && self.player_id.as_deref() != Some(except)
            }
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let role = match params.role.as_deref() {
        Some("operator") => Role::Operator,
        Some("display") => Role::Display,
        _ => Role::Player,
    };
    tracing::info!(?role, "websocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, role, state))
}

/// Handle one WebSocket connection: fan in the shared broadcast stream
/// (filtered by audience) and fan client messages out to the dispatcher.
async fn handle_socket(socket: WebSocket, role: Role, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ctx = ConnCtx::new(role);
    let mut broadcast_rx = state.broadcast.subscribe();

    // Every connection starts from a full snapshot; identity-scoped fields
    // stay empty until the device registers or rejoins.
    let snapshot = state.snapshot(None).await;
    if send_json(&mut sender, &ServerMessage::SyncState { snapshot })
        .await
        .is_err()
    {
        tracing::warn!("failed to send initial snapshot");
        return;
    }

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(envelope) => {
                        if ctx.wants(&envelope.audience)
                            && send_json(&mut sender, &envelope.msg).await.is_err()
                        {
                            break;
                        }
                    }
                    // Fell behind the channel: recover with a snapshot
                    // instead of replaying what was dropped.
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "connection lagged, resyncing");
                        let snapshot = state.snapshot(ctx.identity()).await;
                        if send_json(&mut sender, &ServerMessage::SyncState { snapshot })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let replies =
                                    handlers::handle_message(client_msg, &mut ctx, &state).await;
                                for reply in replies {
                                    if send_json(&mut sender, &reply).await.is_err() {
                                        tracing::error!("failed to send response");
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!("unparseable client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                let _ = send_json(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(role = ?ctx.role, "websocket connection closed");
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_filtering_by_role_and_identity() {
        let operator = ConnCtx::new(Role::Operator);
        let display = ConnCtx::new(Role::Display);
        let mut ada = ConnCtx::new(Role::Player);
        ada.team_id = Some("t1".into());
        ada.player_id = Some("p1".into());
        let mut grace = ConnCtx::new(Role::Player);
        grace.team_id = Some("t1".into());
        grace.player_id = Some("p2".into());

        assert!(operator.wants(&Audience::All));
        assert!(display.wants(&Audience::All));
        assert!(operator.wants(&Audience::Operator));
        assert!(!display.wants(&Audience::Operator));
        assert!(!ada.wants(&Audience::Operator));

        let team = Audience::Team("t1".into());
        assert!(ada.wants(&team));
        assert!(grace.wants(&team));
        assert!(!display.wants(&team));

        // Typing mirror skips the typist.
        let others = Audience::TeamOthers { team_id: "t1".into(), except: "p1".into() };
        assert!(!ada.wants(&others));
        assert!(grace.wants(&others));
    }
}

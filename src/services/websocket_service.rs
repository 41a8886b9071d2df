use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle, time::interval};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::store::PlayerPatch,
    dto::ws::{ClientEnvelope, ErrorPayload, PlayerLeftPayload, ServerEnvelope, ServerMessage},
    error::ServiceError,
    services::message_router,
    state::{
        SharedState,
        connections::{ConnectionHandle, Role},
    },
};

/// Handle the full lifecycle of one WebSocket connection.
///
/// Inbound frames are processed one at a time in arrival order; outbound
/// traffic goes through a dedicated writer task so slow handlers never stall
/// delivery to this socket from elsewhere.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection = ConnectionHandle {
        id: Uuid::new_v4(),
        tx: outbound_tx.clone(),
    };
    state.connections().register(connection.clone());
    info!(connection_id = %connection.id, "connection opened");

    let mut liveness = interval(state.config().heartbeat_interval());
    // The first tick of a tokio interval fires immediately; consume it so the
    // first real ping happens a full period after the connection opens.
    liveness.tick().await;
    let mut pong_pending = false;

    loop {
        tokio::select! {
            _ = liveness.tick() => {
                if pong_pending {
                    warn!(connection_id = %connection.id, "missed pong; disconnecting");
                    break;
                }
                pong_pending = true;
                if outbound_tx.send(Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
                let heartbeat = ServerEnvelope::new(None, ServerMessage::Heartbeat);
                state.connections().send_to(connection.id, &heartbeat);
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        pong_pending = false;
                        match ClientEnvelope::from_json_str(&text) {
                            Ok(envelope) => {
                                message_router::dispatch(&state, &connection, envelope).await;
                            }
                            Err(err) => {
                                warn!(
                                    connection_id = %connection.id,
                                    error = %err,
                                    "failed to parse or validate message"
                                );
                                let invalid = ServiceError::InvalidInput(err.to_string());
                                let reply = ServerEnvelope::new(
                                    None,
                                    ServerMessage::Error(ErrorPayload::from(&invalid)),
                                );
                                state.connections().send_to(connection.id, &reply);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_pending = false;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Err(err)) => {
                        warn!(connection_id = %connection.id, error = %err, "websocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cleanup(&state, &connection).await;
    finalize(writer_task, outbound_tx).await;
}

/// Remove every route pointing at a closed connection and tell the session.
async fn cleanup(state: &SharedState, connection: &ConnectionHandle) {
    let Some(binding) = state.connections().unregister(connection.id) else {
        info!(connection_id = %connection.id, "connection closed before joining");
        return;
    };

    let store = state.store();
    if let Err(err) = store.remove_socket(binding.session_id, connection.id).await {
        warn!(
            connection_id = %connection.id,
            error = %err,
            "failed to clear persisted socket mapping"
        );
    }

    if let (Role::Player, Some(player_id)) = (binding.role, binding.player_id) {
        if let Err(err) = store
            .update_player(
                binding.session_id,
                player_id,
                PlayerPatch {
                    connected: Some(false),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(player_id = %player_id, error = %err, "failed to mark player offline");
        }

        let remaining = match store.get_session_players(binding.session_id).await {
            Ok(players) => players.iter().filter(|p| p.connected).count(),
            Err(err) => {
                warn!(error = %err, "failed to count remaining players");
                0
            }
        };
        let departure = ServerEnvelope::new(
            binding.session_id,
            ServerMessage::PlayerLeft(PlayerLeftPayload {
                player_id,
                player_count: remaining,
            }),
        );
        state
            .connections()
            .broadcast(binding.session_id, &departure, None);
    }

    info!(connection_id = %connection.id, session_id = %binding.session_id, "connection closed");
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

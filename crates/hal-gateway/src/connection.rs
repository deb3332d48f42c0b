use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hal_db::Database;
use hal_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unauthenticated socket may stay open before Identify.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub jwt_secret: Arc<str>,
}

/// Handle a connection whose token was already checked at the HTTP upgrade.
pub async fn handle_connection_authenticated(socket: WebSocket, ctx: GatewayContext, user_id: Uuid, name: String) {
    let (sender, receiver) = socket.split();
    info!("{} ({}) connected to gateway (pre-authenticated)", name, user_id);
    run_connection_loop(sender, receiver, ctx, user_id, name).await;
}

/// Handle a connection that authenticates with an Identify command.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (sender, mut receiver) = socket.split();

    let (user_id, name) = match wait_for_identify(&mut receiver, &ctx).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, user_id);
    run_connection_loop(sender, receiver, ctx, user_id, name).await;
}

/// Resolve a JWT to an active user. Returns (user_id, name).
pub async fn authenticate(db: Arc<Database>, jwt_secret: &str, token: &str) -> Option<(Uuid, String)> {
    use hal_types::api::Claims;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?
    .claims;

    let user = tokio::task::spawn_blocking(move || db.get_user_by_id(claims.sub))
        .await
        .ok()?
        .ok()
        .flatten()?;

    if !user.is_active {
        warn!("Deactivated user {} tried to open the gateway", user.id);
        return None;
    }
    Some((user.id, user.name))
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    ctx: &GatewayContext,
) -> Option<(Uuid, String)> {
    let identify = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    return authenticate(ctx.db.clone(), &ctx.jwt_secret, &token).await;
                }
            }
        }
        None
    });

    identify.await.ok().flatten()
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            None
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match encode(event) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => true,
    }
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    user_id: Uuid,
    name: String,
) {
    if !send_event(&mut sender, &GatewayEvent::Ready { user_id, name: name.clone() }).await {
        return;
    }

    let dispatcher = ctx.dispatcher.clone();
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    // Tell the client who is already here before announcing ourselves
    for uid in dispatcher.online_users().await {
        let event = GatewayEvent::PresenceUpdate {
            user_id: uid,
            online: true,
        };
        if !send_event(&mut sender, &event).await {
            // Not counted online yet
            dispatcher.unregister_user_channel(user_id, conn_id).await;
            return;
        }
    }

    dispatcher.user_online(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_ctx = ctx.clone();
    let name_recv = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn handle_command(ctx: &GatewayContext, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::StartTyping { conversation_id } => {
            relay_typing(ctx, user_id, conversation_id, true).await;
        }

        GatewayCommand::StopTyping { conversation_id } => {
            relay_typing(ctx, user_id, conversation_id, false).await;
        }

        GatewayCommand::MarkRead { conversation_id } => {
            match mark_read(&ctx.dispatcher, ctx.db.clone(), conversation_id, user_id).await {
                Ok(Some((n, _))) => debug!("{} marked {} messages read in {}", user_id, n, conversation_id),
                Ok(None) => warn!("{} tried to mark foreign conversation {} read", user_id, conversation_id),
                Err(e) => error!("MarkRead failed for {}: {:#}", conversation_id, e),
            }
        }
    }
}

/// The other participant of a conversation the user belongs to.
async fn counterpart(db: Arc<Database>, conversation_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let conversation = tokio::task::spawn_blocking(move || db.get_conversation(conversation_id)).await??;
    Ok(conversation
        .filter(|c| c.is_participant(user_id))
        .map(|c| c.other_participant(user_id)))
}

async fn relay_typing(ctx: &GatewayContext, user_id: Uuid, conversation_id: Uuid, started: bool) {
    let other = match counterpart(ctx.db.clone(), conversation_id, user_id).await {
        Ok(Some(other)) => other,
        Ok(None) => {
            warn!("{} sent typing for foreign conversation {}", user_id, conversation_id);
            return;
        }
        Err(e) => {
            error!("Typing lookup failed for {}: {:#}", conversation_id, e);
            return;
        }
    };

    let event = if started {
        GatewayEvent::TypingStart { conversation_id, user_id }
    } else {
        GatewayEvent::TypingStop { conversation_id, user_id }
    };
    ctx.dispatcher.send_to_user(other, event).await;
}

/// Mark the counterpart's messages read and tell them. `None` when the
/// reader is not a participant.
pub async fn mark_read(
    dispatcher: &Dispatcher,
    db: Arc<Database>,
    conversation_id: Uuid,
    reader_id: Uuid,
) -> anyhow::Result<Option<(usize, DateTime<Utc>)>> {
    let Some(other) = counterpart(db.clone(), conversation_id, reader_id).await? else {
        return Ok(None);
    };

    let (updated, read_at) =
        tokio::task::spawn_blocking(move || db.mark_conversation_read(conversation_id, reader_id)).await??;

    if updated > 0 {
        dispatcher
            .send_to_user(
                other,
                GatewayEvent::MessagesRead {
                    conversation_id,
                    reader_id,
                    read_at,
                },
            )
            .await;
    }
    Ok(Some((updated, read_at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal_db::models::NewUser;
    use hal_types::models::UserType;

    fn user(db: &Database, email: &str) -> Uuid {
        db.create_user(&NewUser {
            name: "Ali Veli",
            email,
            password_hash: "hash",
            phone: "05551234567",
            user_type: UserType::Buyer,
        })
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn mark_read_notifies_only_the_counterpart() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let buyer = user(&db, "b@example.com");
        let seller = user(&db, "s@example.com");
        let outsider = user(&db, "o@example.com");
        let (conv, _) = db.get_or_create_conversation(buyer, seller, None).unwrap();
        db.insert_message(conv.id, buyer, "Merhaba").unwrap();

        let dispatcher = Dispatcher::new();
        let (_, mut buyer_rx) = dispatcher.register_user_channel(buyer).await;
        let (_, mut seller_rx) = dispatcher.register_user_channel(seller).await;

        assert!(mark_read(&dispatcher, db.clone(), conv.id, outsider).await.unwrap().is_none());

        let (updated, _) = mark_read(&dispatcher, db.clone(), conv.id, seller).await.unwrap().unwrap();
        assert_eq!(updated, 1);
        assert!(matches!(
            buyer_rx.try_recv(),
            Ok(GatewayEvent::MessagesRead { reader_id, .. }) if reader_id == seller
        ));
        assert!(seller_rx.try_recv().is_err());

        // nothing left to read, nothing pushed
        let (updated, _) = mark_read(&dispatcher, db, conv.id, seller).await.unwrap().unwrap();
        assert_eq!(updated, 0);
        assert!(buyer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_goes_to_the_other_participant() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let buyer = user(&db, "b@example.com");
        let seller = user(&db, "s@example.com");
        let (conv, _) = db.get_or_create_conversation(buyer, seller, None).unwrap();

        let ctx = GatewayContext {
            dispatcher: Dispatcher::new(),
            db,
            jwt_secret: Arc::from("secret"),
        };
        let (_, mut buyer_rx) = ctx.dispatcher.register_user_channel(buyer).await;
        let (_, mut seller_rx) = ctx.dispatcher.register_user_channel(seller).await;

        handle_command(&ctx, buyer, GatewayCommand::StartTyping { conversation_id: conv.id }).await;
        assert!(matches!(seller_rx.try_recv(), Ok(GatewayEvent::TypingStart { user_id, .. }) if user_id == buyer));
        assert!(buyer_rx.try_recv().is_err());

        handle_command(&ctx, seller, GatewayCommand::StopTyping { conversation_id: conv.id }).await;
        assert!(matches!(buyer_rx.try_recv(), Ok(GatewayEvent::TypingStop { .. })));
    }

    #[tokio::test]
    async fn authenticate_rejects_bad_tokens_and_inactive_users() {
        use hal_types::api::Claims;
        use jsonwebtoken::{EncodingKey, Header, encode};

        let db = Arc::new(Database::open_in_memory().unwrap());
        let id = user(&db, "u@example.com");
        let token = |secret: &str| {
            let claims = Claims {
                sub: id,
                exp: (Utc::now().timestamp() + 3600) as usize,
            };
            encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
        };

        assert_eq!(authenticate(db.clone(), "secret", &token("secret")).await.map(|(u, _)| u), Some(id));
        assert!(authenticate(db.clone(), "secret", &token("other")).await.is_none());

        db.set_user_active(id, false).unwrap();
        assert!(authenticate(db, "secret", &token("secret")).await.is_none());
    }
}

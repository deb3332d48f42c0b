use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use hal_types::events::GatewayEvent;

/// Tracks connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for presence events. Every connection receives these.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Online users: user_id -> number of open connections
    online_users: RwLock<HashMap<Uuid, usize>>,

    /// Targeted send channels: user_id -> (conn_id -> sender).
    /// A user may be connected from several devices at once.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a targeted channel for one connection. Returns (conn_id, receiver).
    pub async fn register_user_channel(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove one connection's channel without touching presence. For
    /// connections that close before `user_online` counted them.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for tx in conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        for user_id in user_ids {
            self.send_to_user(*user_id, event.clone()).await;
        }
    }

    /// Count a new connection. Presence is broadcast only for the first one.
    pub async fn user_online(&self, user_id: Uuid) {
        let first = {
            let mut online = self.inner.online_users.write().await;
            let count = online.entry(user_id).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            self.broadcast(GatewayEvent::PresenceUpdate {
                user_id,
                online: true,
            });
        }
    }

    /// Drop a connection. The user goes offline when their last one closes.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        self.unregister_user_channel(user_id, conn_id).await;

        let last = {
            let mut online = self.inner.online_users.write().await;
            match online.get_mut(&user_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    online.remove(&user_id);
                    true
                }
                None => false,
            }
        };

        if last {
            self.broadcast(GatewayEvent::PresenceUpdate {
                user_id,
                online: false,
            });
        }
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.online_users.read().await.keys().copied().collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.online_users.read().await.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn targeted_events_reach_every_device() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (_, mut phone) = dispatcher.register_user_channel(user).await;
        let (_, mut laptop) = dispatcher.register_user_channel(user).await;
        let (_, mut bystander) = dispatcher.register_user_channel(other).await;

        dispatcher
            .send_to_user(
                user,
                GatewayEvent::TypingStart {
                    conversation_id: Uuid::new_v4(),
                    user_id: other,
                },
            )
            .await;

        assert!(matches!(phone.try_recv(), Ok(GatewayEvent::TypingStart { .. })));
        assert!(matches!(laptop.try_recv(), Ok(GatewayEvent::TypingStart { .. })));
        assert!(bystander.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_only_after_last_connection() {
        let dispatcher = Dispatcher::new();
        let mut presence = dispatcher.subscribe();
        let user = Uuid::new_v4();

        let (a, _rx_a) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user).await;
        let (b, _rx_b) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user).await;

        // one broadcast for the first connection only
        assert!(matches!(
            presence.try_recv(),
            Ok(GatewayEvent::PresenceUpdate { online: true, .. })
        ));
        assert!(presence.try_recv().is_err());

        dispatcher.user_offline(user, a).await;
        assert!(dispatcher.is_online(user).await);
        assert!(presence.try_recv().is_err());

        dispatcher.user_offline(user, b).await;
        assert!(!dispatcher.is_online(user).await);
        assert!(matches!(
            presence.try_recv(),
            Ok(GatewayEvent::PresenceUpdate { online: false, .. })
        ));
    }

    #[tokio::test]
    async fn uncounted_connection_leaves_presence_alone() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (live, _rx_live) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user).await;
        let mut presence = dispatcher.subscribe();

        // second device drops during its handshake
        let (early, mut rx_early) = dispatcher.register_user_channel(user).await;
        dispatcher.unregister_user_channel(user, early).await;

        assert!(dispatcher.is_online(user).await);
        assert!(presence.try_recv().is_err());
        assert!(rx_early.try_recv().is_err());

        dispatcher.user_offline(user, live).await;
        assert!(matches!(
            presence.try_recv(),
            Ok(GatewayEvent::PresenceUpdate { online: false, .. })
        ));
    }

    #[tokio::test]
    async fn closed_connection_stops_receiving() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn, mut rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user).await;
        dispatcher.user_offline(user, conn).await;

        dispatcher
            .send_to_users(
                &[user],
                GatewayEvent::PresenceUpdate {
                    user_id: user,
                    online: true,
                },
            )
            .await;
        // sender dropped on unregister, so the channel is closed and empty
        assert!(rx.try_recv().is_err());
        assert!(dispatcher.online_users().await.is_empty());
    }
}

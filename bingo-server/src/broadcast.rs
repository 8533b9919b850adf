//! Per-game fan-out to player and spectator connections.
//!
//! Every connection owns a bounded queue. Publishing never waits: a
//! subscriber whose queue is full or closed is dropped from the registry,
//! which ends its connection instead of stalling the rest of the game.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bingo_core::{GameId, PlayerId};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::protocol::ServerMessage;

pub type ConnectionId = u64;
pub type Outbound = Arc<ServerMessage>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Player {
        player_id: PlayerId,
        show_own_events: bool,
    },
    Spectator,
}

#[derive(Debug)]
struct Subscriber {
    game_id: GameId,
    role: Role,
    tx: mpsc::Sender<Outbound>,
}

impl Subscriber {
    fn wants(&self, id: ConnectionId, message: &ServerMessage, origin: Option<ConnectionId>) -> bool {
        match &self.role {
            Role::Spectator => message.is_game_wide(),
            Role::Player {
                show_own_events, ..
            } => origin != Some(id) || *show_own_events,
        }
    }
}

#[derive(Debug)]
struct Registry {
    next_id: AtomicU64,
    buffer: usize,
    subscribers: DashMap<ConnectionId, Subscriber>,
    channels: DashMap<GameId, HashSet<ConnectionId>>,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    inner: Arc<Registry>,
}

/// Registration of one connection. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: ConnectionId,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

enum Delivery {
    Sent,
    Skipped,
    Dead,
}

#[derive(Clone, Copy)]
enum Scope {
    Direct,
    Channel { origin: Option<ConnectionId> },
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                subscribers: DashMap::new(),
                channels: DashMap::new(),
            }),
        }
    }

    pub fn subscribe(
        &self,
        game_id: &str,
        role: Role,
    ) -> (Subscription, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(
            id,
            Subscriber {
                game_id: game_id.to_string(),
                role,
                tx,
            },
        );
        self.inner
            .channels
            .entry(game_id.to_string())
            .or_default()
            .insert(id);
        debug!(connection = id, game = %game_id, "subscribed");

        let subscription = Subscription {
            id,
            broadcaster: self.clone(),
        };
        (subscription, rx)
    }

    /// Removes a connection. Safe to call more than once.
    pub fn unsubscribe(&self, id: ConnectionId) {
        let Some((_, subscriber)) = self.inner.subscribers.remove(&id) else {
            return;
        };
        if let Some(mut set) = self.inner.channels.get_mut(&subscriber.game_id) {
            set.remove(&id);
        }
        self.inner
            .channels
            .remove_if(&subscriber.game_id, |_, set| set.is_empty());
        debug!(connection = id, game = %subscriber.game_id, "unsubscribed");
    }

    /// Fans `message` out to the game's channel. `origin` is the connection
    /// that caused it; it only gets an echo if it asked for its own events.
    /// Returns how many connections were handed the message.
    pub fn publish(
        &self,
        game_id: &str,
        message: ServerMessage,
        origin: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<ConnectionId> = match self.inner.channels.get(game_id) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let message = Arc::new(message);
        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in targets {
            match self.deliver(id, &message, Scope::Channel { origin }) {
                Delivery::Sent => delivered += 1,
                Delivery::Skipped => {}
                Delivery::Dead => dead.push(id),
            }
        }
        for id in dead {
            self.unsubscribe(id);
        }
        delivered
    }

    /// Targeted reply to one connection, bypassing role filtering.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        let message = Arc::new(message);
        match self.deliver(id, &message, Scope::Direct) {
            Delivery::Sent => true,
            Delivery::Skipped => false,
            Delivery::Dead => {
                self.unsubscribe(id);
                false
            }
        }
    }

    fn deliver(
        &self,
        id: ConnectionId,
        message: &Outbound,
        scope: Scope,
    ) -> Delivery {
        let Some(subscriber) = self.inner.subscribers.get(&id) else {
            return Delivery::Skipped;
        };
        if let Scope::Channel { origin } = scope {
            if !subscriber.wants(id, message, origin) {
                return Delivery::Skipped;
            }
        }
        match subscriber.tx.try_send(Arc::clone(message)) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                warn!(connection = id, game = %subscriber.game_id, "dropping slow subscriber");
                Delivery::Dead
            }
            Err(TrySendError::Closed(_)) => Delivery::Dead,
        }
    }

    /// Updates the echo preference on every connection of one player.
    pub fn set_show_own_events(&self, player_id: &str, show: bool) {
        for mut entry in self.inner.subscribers.iter_mut() {
            if let Role::Player {
                player_id: owner,
                show_own_events,
            } = &mut entry.role
            {
                if owner == player_id {
                    *show_own_events = show;
                }
            }
        }
    }

    /// Live connections one player still holds, across tabs.
    pub fn player_connections(&self, player_id: &str) -> usize {
        self.inner
            .subscribers
            .iter()
            .filter(|entry| {
                matches!(&entry.role, Role::Player { player_id: owner, .. } if owner == player_id)
            })
            .count()
    }

    pub fn connection_count(&self, game_id: &str) -> usize {
        self.inner
            .channels
            .get(game_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Drops every subscriber, closing all outbound queues.
    pub fn shutdown(&self) {
        let count = self.inner.subscribers.len();
        self.inner.subscribers.clear();
        self.inner.channels.clear();
        info!(connections = count, "broadcaster shut down");
    }
}

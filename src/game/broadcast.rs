//! Outbound message routing for a room

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::ws::protocol::ServerMsg;

use super::entities::ConnId;

/// Who receives an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every member of the room
    Room,
    /// A single member
    Only(ConnId),
    /// Every member except one
    Others(ConnId),
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

/// Messages produced by the simulation, waiting for delivery
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outbound>,
}

impl Outbox {
    pub fn room(&mut self, msg: ServerMsg) {
        self.push(Audience::Room, msg);
    }

    pub fn to(&mut self, conn_id: ConnId, msg: ServerMsg) {
        self.push(Audience::Only(conn_id), msg);
    }

    pub fn others(&mut self, conn_id: ConnId, msg: ServerMsg) {
        self.push(Audience::Others(conn_id), msg);
    }

    fn push(&mut self, audience: Audience, msg: ServerMsg) {
        self.queue.push(Outbound { audience, msg });
    }

    pub fn take(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.queue)
    }
}

/// Outbound channels of the connections in a room
#[derive(Debug, Default)]
pub struct Members {
    senders: HashMap<ConnId, mpsc::Sender<ServerMsg>>,
}

impl Members {
    pub fn insert(&mut self, conn_id: ConnId, tx: mpsc::Sender<ServerMsg>) {
        self.senders.insert(conn_id, tx);
    }

    pub fn remove(&mut self, conn_id: &ConnId) {
        self.senders.remove(conn_id);
    }

    /// Hand a message to each recipient without waiting on slow sockets
    pub fn deliver(&self, outbound: Outbound) {
        match outbound.audience {
            Audience::Room => {
                for (conn_id, tx) in &self.senders {
                    send_now(*conn_id, tx, outbound.msg.clone());
                }
            }
            Audience::Only(target) => {
                if let Some(tx) = self.senders.get(&target) {
                    send_now(target, tx, outbound.msg);
                }
            }
            Audience::Others(excluded) => {
                for (conn_id, tx) in self.senders.iter().filter(|(id, _)| **id != excluded) {
                    send_now(*conn_id, tx, outbound.msg.clone());
                }
            }
        }
    }
}

/// Non-blocking send; a dropped message is healed by the next snapshot
pub fn send_now(conn_id: ConnId, tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
    match tx.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            debug!(player_id = %conn_id, "Outbound queue full, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player_id = %conn_id, "Outbound channel closed");
        }
    }
}

//! Session registry shared by connection tasks and the world runner.
//!
//! Connection tasks register sessions and redeem instance keys; the world
//! runner only ever looks sessions up to hand them frames. Both sides touch
//! the registry concurrently, so it is backed by `DashMap` shards rather
//! than a single lock.

use super::session::{AccountInfo, Session};
use crate::error::SessionError;
use dashmap::DashMap;
use rand::Rng;
use realm_protocol::EncodedFrame;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use world_sim::SessionId;

/// A connect key issued with `SMSG_CONNECT_TO`, waiting to be presented on
/// a new instance socket.
#[derive(Debug, Clone, Copy)]
struct PendingInstance {
    session: SessionId,
    serial: u32,
}

/// Central registry of live sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
    connect_keys: DashMap<u64, PendingInstance>,
    next_id: AtomicU64,
    next_serial: AtomicU64,
    queue_limit: usize,
}

impl SessionManager {
    /// Creates a registry whose sessions buffer up to `queue_limit` frames
    /// per connection slot.
    pub fn new(queue_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            connect_keys: DashMap::new(),
            next_id: AtomicU64::new(1),
            next_serial: AtomicU64::new(1),
            queue_limit,
        }
    }

    /// Registers a freshly authenticated session.
    pub fn create_session(&self, account: AccountInfo, remote_addr: SocketAddr) -> Arc<Session> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::new(id, account, remote_addr, self.queue_limit));
        self.sessions.insert(id, Arc::clone(&session));
        info!(
            "🔗 {} authenticated as '{}' from {}",
            id,
            session.account().account_name,
            remote_addr
        );
        session
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and closes a session, dropping any connect key it still holds.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&id)?;
        session.close();
        self.connect_keys.retain(|_, pending| pending.session != id);
        info!("🔌 {} removed", id);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Hands `frame` to a session. A session whose queue overflows is closed
    /// here so one slow client never affects the others.
    pub fn send(&self, id: SessionId, frame: EncodedFrame) -> Result<(), SessionError> {
        let session = self.get(id).ok_or(SessionError::UnknownSession(id))?;
        let result = session.send(frame);
        if let Err(SessionError::QueueOverflow { limit, .. }) = &result {
            warn!(session = %id, limit, "Outbound queue overflow, closing session");
            session.close();
        }
        result
    }

    /// Issues a one-time key the client presents on its instance socket.
    ///
    /// # Returns
    ///
    /// The key and its serial, both echoed back in
    /// `CMSG_AUTH_CONTINUED_SESSION`.
    pub fn issue_connect_key(&self, session: SessionId) -> (u64, u32) {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed) as u32;
        let mut rng = rand::thread_rng();
        loop {
            let key: u64 = rng.gen();
            if key == 0 {
                continue;
            }
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.connect_keys.entry(key) {
                slot.insert(PendingInstance { session, serial });
                return (key, serial);
            }
        }
    }

    /// Consumes a connect key. Keys are single use; a wrong serial burns the
    /// key as well.
    pub fn redeem_connect_key(&self, key: u64, serial: u32) -> Option<Arc<Session>> {
        let (_, pending) = self.connect_keys.remove(&key)?;
        if pending.serial != serial {
            warn!(session = %pending.session, "Connect key presented with wrong serial");
            return None;
        }
        self.get(pending.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_protocol::{encode_packet, packets::DestroyObject, Locale};

    fn account(name: &str) -> AccountInfo {
        AccountInfo {
            account_id: 1,
            account_name: name.into(),
            build: 1,
            locale: Locale::EnUs,
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn connect_keys_are_single_use() {
        let manager = SessionManager::new(4);
        let session = manager.create_session(account("a"), addr());
        let (key, serial) = manager.issue_connect_key(session.id());

        let redeemed = manager.redeem_connect_key(key, serial).unwrap();
        assert_eq!(redeemed.id(), session.id());
        assert!(manager.redeem_connect_key(key, serial).is_none());
    }

    #[test]
    fn wrong_serial_burns_the_key() {
        let manager = SessionManager::new(4);
        let session = manager.create_session(account("a"), addr());
        let (key, serial) = manager.issue_connect_key(session.id());

        assert!(manager.redeem_connect_key(key, serial.wrapping_add(1)).is_none());
        assert!(manager.redeem_connect_key(key, serial).is_none());
    }

    #[test]
    fn overflow_closes_only_that_session() {
        let manager = SessionManager::new(1);
        let slow = manager.create_session(account("slow"), addr());
        let other = manager.create_session(account("other"), addr());
        let frame = encode_packet(&DestroyObject { guid: 1, on_death: false }).unwrap();

        manager.send(slow.id(), frame.clone()).unwrap();
        assert!(matches!(
            manager.send(slow.id(), frame.clone()),
            Err(SessionError::QueueOverflow { .. })
        ));
        assert!(slow.is_closed());
        assert!(!other.is_closed());
        manager.send(other.id(), frame).unwrap();
    }

    #[test]
    fn removing_a_session_closes_it_and_revokes_keys() {
        let manager = SessionManager::new(4);
        let session = manager.create_session(account("a"), addr());
        let (key, serial) = manager.issue_connect_key(session.id());

        manager.remove(session.id()).unwrap();
        assert!(session.is_closed());
        assert!(manager.is_empty());
        assert!(manager.redeem_connect_key(key, serial).is_none());
    }
}

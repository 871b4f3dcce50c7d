//! A client session and its two connection slots.
//!
//! A session outlives its sockets in one direction only: the realm socket
//! lives exactly as long as the session, while the instance socket comes and
//! goes as the player enters and leaves maps. Frames for a slot without a
//! live socket are parked in that slot's pending queue and written, in
//! order, once a socket attaches.

use realm_protocol::{ConnectionType, EncodedFrame, Locale};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use world_sim::SessionId;

use crate::error::SessionError;

/// Identity presented in `CMSG_AUTH_SESSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_id: u32,
    pub account_name: String,
    pub build: u32,
    pub locale: Locale,
}

#[derive(Debug)]
enum Slot {
    /// No socket; frames wait here.
    Detached(VecDeque<EncodedFrame>),
    /// Frames go to the socket's writer task.
    Attached(mpsc::Sender<EncodedFrame>),
}

impl Default for Slot {
    fn default() -> Self {
        Slot::Detached(VecDeque::new())
    }
}

/// Represents an authenticated client session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    account: AccountInfo,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    queue_limit: usize,
    slots: Mutex<[Slot; 2]>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub fn new(id: SessionId, account: AccountInfo, remote_addr: SocketAddr, queue_limit: usize) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            account,
            remote_addr,
            connected_at: SystemTime::now(),
            queue_limit: queue_limit.max(1),
            slots: Mutex::new([Slot::default(), Slot::default()]),
            closed,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub fn locale(&self) -> Locale {
        self.account.locale
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Depth of each slot's pending queue and of each socket's channel.
    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    // A panic while the lock is held cannot leave the slots half-updated, so
    // a poisoned lock is still safe to use.
    fn slots(&self) -> MutexGuard<'_, [Slot; 2]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes `frame` to the slot named by its connection type.
    ///
    /// # Returns
    ///
    /// `SessionError::QueueOverflow` when the slot's bound is exceeded. The
    /// caller is expected to close the session.
    pub fn send(&self, frame: EncodedFrame) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        let mut slots = self.slots();
        let slot = &mut slots[frame.connection.index()];
        match slot {
            Slot::Attached(sender) => match sender.try_send(frame) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => Err(self.overflow()),
                Err(mpsc::error::TrySendError::Closed(frame)) => {
                    // The writer is gone but the slot has not been detached
                    // yet. Keep the frame for the next socket.
                    let mut pending = VecDeque::with_capacity(1);
                    pending.push_back(frame);
                    *slot = Slot::Detached(pending);
                    Ok(())
                }
            },
            Slot::Detached(pending) => {
                if pending.len() >= self.queue_limit {
                    return Err(self.overflow());
                }
                pending.push_back(frame);
                Ok(())
            }
        }
    }

    /// Attaches a socket's writer channel to `connection` and flushes the
    /// frames queued while the slot was detached, oldest first.
    ///
    /// # Returns
    ///
    /// The number of frames flushed.
    pub fn attach(
        &self,
        connection: ConnectionType,
        sender: mpsc::Sender<EncodedFrame>,
    ) -> Result<usize, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        let mut slots = self.slots();
        let slot = &mut slots[connection.index()];
        let pending = match std::mem::replace(slot, Slot::Attached(sender.clone())) {
            Slot::Detached(pending) => pending,
            // A newer socket replaces the old one; its writer drains and exits.
            Slot::Attached(_) => VecDeque::new(),
        };
        let flushed = pending.len();
        for frame in pending {
            if sender.try_send(frame).is_err() {
                return Err(self.overflow());
            }
        }
        debug!(session = %self.id, %connection, flushed, "Connection attached");
        Ok(flushed)
    }

    /// Drops the socket of `connection`. Later frames queue again.
    pub fn detach(&self, connection: ConnectionType) {
        self.slots()[connection.index()] = Slot::default();
    }

    /// Detaches `connection` only if `sender` is still the attached socket,
    /// so a socket shutting down never unhooks its replacement.
    ///
    /// The socket keeps only a weak handle so that its writer still sees the
    /// channel close when the slot is replaced or cleared.
    pub fn detach_sender(&self, connection: ConnectionType, sender: &mpsc::WeakSender<EncodedFrame>) -> bool {
        let Some(sender) = sender.upgrade() else {
            return false;
        };
        let mut slots = self.slots();
        let slot = &mut slots[connection.index()];
        match slot {
            Slot::Attached(current) if current.same_channel(&sender) => {
                *slot = Slot::default();
                true
            }
            _ => false,
        }
    }

    /// Whether `connection` currently has a live socket.
    pub fn is_attached(&self, connection: ConnectionType) -> bool {
        matches!(self.slots()[connection.index()], Slot::Attached(_))
    }

    /// Frames waiting for `connection` to attach.
    pub fn pending(&self, connection: ConnectionType) -> usize {
        match &self.slots()[connection.index()] {
            Slot::Detached(pending) => pending.len(),
            Slot::Attached(_) => 0,
        }
    }

    /// Ends the session. Writers finish the frames already handed to them
    /// and then exit; readers observe the signal and stop.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        let mut slots = self.slots();
        for slot in slots.iter_mut() {
            *slot = Slot::default();
        }
        debug!(session = %self.id, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Receiver that flips to `true` when the session is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    fn overflow(&self) -> SessionError {
        SessionError::QueueOverflow {
            session: self.id,
            limit: self.queue_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_protocol::packets::{DestroyObject, Pong};
    use realm_protocol::{decode_response, encode_packet};

    fn session(limit: usize) -> Session {
        let account = AccountInfo {
            account_id: 1,
            account_name: "tester".into(),
            build: 1,
            locale: Locale::EnUs,
        };
        Session::new(SessionId(7), account, "127.0.0.1:5000".parse().unwrap(), limit)
    }

    fn instance_frame(guid: u64) -> EncodedFrame {
        encode_packet(&DestroyObject { guid, on_death: false }).unwrap()
    }

    #[test]
    fn detached_slot_queues_up_to_the_limit() {
        let session = session(2);
        session.send(instance_frame(1)).unwrap();
        session.send(instance_frame(2)).unwrap();
        assert_eq!(session.pending(ConnectionType::Instance), 2);

        let err = session.send(instance_frame(3)).unwrap_err();
        assert_eq!(
            err,
            SessionError::QueueOverflow {
                session: SessionId(7),
                limit: 2
            }
        );
        // The realm slot has its own queue.
        session.send(encode_packet(&Pong { serial: 1 }).unwrap()).unwrap();
    }

    #[test]
    fn attach_flushes_pending_frames_in_order() {
        let session = session(8);
        for guid in 1..=3 {
            session.send(instance_frame(guid)).unwrap();
        }

        let (tx, mut rx) = mpsc::channel(8);
        assert_eq!(session.attach(ConnectionType::Instance, tx).unwrap(), 3);
        session.send(instance_frame(4)).unwrap();

        let mut order = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            order.push(decode_response::<DestroyObject>(frame.payload()).unwrap().guid);
        }
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(session.pending(ConnectionType::Instance), 0);
    }

    #[test]
    fn full_channel_is_an_overflow() {
        let session = session(1);
        let (tx, _rx) = mpsc::channel(1);
        session.attach(ConnectionType::Instance, tx).unwrap();
        session.send(instance_frame(1)).unwrap();
        assert!(matches!(
            session.send(instance_frame(2)),
            Err(SessionError::QueueOverflow { .. })
        ));
    }

    #[test]
    fn frames_survive_a_dead_writer() {
        let session = session(4);
        let (tx, rx) = mpsc::channel(4);
        session.attach(ConnectionType::Instance, tx).unwrap();
        drop(rx);

        session.send(instance_frame(9)).unwrap();
        assert_eq!(session.pending(ConnectionType::Instance), 1);
        assert!(!session.is_attached(ConnectionType::Instance));
    }

    #[test]
    fn stale_socket_does_not_detach_its_replacement() {
        let session = session(4);
        let (old_tx, _old_rx) = mpsc::channel(4);
        let old = old_tx.downgrade();
        session.attach(ConnectionType::Instance, old_tx).unwrap();

        let (new_tx, _new_rx) = mpsc::channel(4);
        session.attach(ConnectionType::Instance, new_tx).unwrap();

        assert!(!session.detach_sender(ConnectionType::Instance, &old));
        assert!(session.is_attached(ConnectionType::Instance));
    }

    #[test]
    fn closing_detaches_everything_and_rejects_sends() {
        let session = session(4);
        let (tx, _rx) = mpsc::channel(4);
        session.attach(ConnectionType::Realm, tx).unwrap();
        let signal = session.closed_signal();

        session.close();
        assert!(*signal.borrow());
        assert!(!session.is_attached(ConnectionType::Realm));
        assert_eq!(
            session.send(instance_frame(1)),
            Err(SessionError::Closed(SessionId(7)))
        );
    }
}

use std::net::SocketAddr;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Identifies one connection attempt to a backend address.
///
/// An address that is removed and later resolved again gets a new identifier, so background
/// tasks of the old entry cannot update the new one.
pub type SubchannelId = u64;

#[derive(Debug)]
enum State<C> {
    Connecting,
    Ready(C),
    TransientFailure,
}

#[derive(Debug)]
struct Subchannel<C> {
    id: SubchannelId,
    addr: SocketAddr,
    state: State<C>,
}

/// A connected channel selected for a call.
#[derive(Debug)]
pub struct Picked<C> {
    pub id: SubchannelId,
    pub addr: SocketAddr,
    pub channel: C,
}

/// Outcome of a single balancing decision.
#[derive(Debug)]
pub enum Pick<C> {
    /// A connected channel was selected.
    Ready(Picked<C>),
    /// No channel is connected, but at least one is still connecting.
    Wait,
    /// All channels have failed.
    Unavailable,
}

/// Round-robin over the connected channels of all backend addresses.
///
/// Every address is tracked with its connectivity state. Only connected channels are handed out.
/// Callers that find no connected channel wait for the first connection attempts to finish and
/// fail fast once every address has failed.
#[derive(Debug)]
pub struct Subchannels<C> {
    entries: RwLock<Vec<Subchannel<C>>>,
    next: AtomicUsize,
    ids: AtomicU64,
    changed: Notify,
}

impl<C: Clone> Subchannels<C> {
    /// Creates an empty set of subchannels.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
            ids: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    /// Returns the number of tracked addresses.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the subchannel has not been removed.
    pub fn contains(&self, id: SubchannelId) -> bool {
        self.entries.read().iter().any(|entry| entry.id == id)
    }

    /// Replaces the tracked addresses with `addrs`.
    ///
    /// Known addresses keep their state. New addresses start connecting and are returned, the
    /// caller is responsible for connecting them.
    pub fn update(&self, addrs: &[SocketAddr]) -> Vec<(SubchannelId, SocketAddr)> {
        let mut entries = self.entries.write();
        entries.retain(|entry| addrs.contains(&entry.addr));

        let mut added = Vec::new();
        for &addr in addrs {
            if entries.iter().any(|entry| entry.addr == addr) {
                continue;
            }

            let id = self.ids.fetch_add(1, Ordering::Relaxed);
            entries.push(Subchannel {
                id,
                addr,
                state: State::Connecting,
            });
            added.push((id, addr));
        }

        drop(entries);
        self.changed.notify_waiters();
        added
    }

    /// Marks a subchannel as connected.
    ///
    /// Returns `false` if the subchannel has been removed in the meanwhile.
    pub fn set_ready(&self, id: SubchannelId, channel: C) -> bool {
        let updated = self.transition(id, State::Ready(channel)).is_some();
        self.changed.notify_waiters();
        updated
    }

    /// Marks a subchannel as failed.
    ///
    /// Returns `true` only if the subchannel was connected before. Exactly one caller observes
    /// this transition and must start reconnecting.
    pub fn set_failed(&self, id: SubchannelId) -> bool {
        let was_ready = matches!(
            self.transition(id, State::TransientFailure),
            Some(State::Ready(_))
        );
        self.changed.notify_waiters();
        was_ready
    }

    fn transition(&self, id: SubchannelId, state: State<C>) -> Option<State<C>> {
        let mut entries = self.entries.write();
        let entry = entries.iter_mut().find(|entry| entry.id == id)?;
        Some(std::mem::replace(&mut entry.state, state))
    }

    /// Selects the next connected channel without waiting.
    pub fn pick(&self) -> Pick<C> {
        let entries = self.entries.read();
        let mut ready = entries.iter().filter_map(|entry| match entry.state {
            State::Ready(ref channel) => Some((entry, channel)),
            _ => None,
        });

        let count = ready.clone().count();
        if count == 0 {
            let connecting = entries
                .iter()
                .any(|entry| matches!(entry.state, State::Connecting));
            return if connecting {
                Pick::Wait
            } else {
                Pick::Unavailable
            };
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % count;
        match ready.nth(index) {
            Some((entry, channel)) => Pick::Ready(Picked {
                id: entry.id,
                addr: entry.addr,
                channel: channel.clone(),
            }),
            None => Pick::Unavailable,
        }
    }

    /// Selects the next connected channel, waiting while addresses are still connecting.
    ///
    /// Returns `None` if no address can be reached.
    pub async fn wait_ready(&self) -> Option<Picked<C>> {
        loop {
            let mut changed = pin!(self.changed.notified());
            changed.as_mut().enable();

            match self.pick() {
                Pick::Ready(picked) => return Some(picked),
                Pick::Unavailable => return None,
                Pick::Wait => changed.await,
            }
        }
    }
}

impl<C: Clone> Default for Subchannels<C> {
    fn default() -> Self {
        Self::new()
    }
}

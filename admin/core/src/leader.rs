// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::watch;

/// Leadership election as seen by this process. Only the leader of a cluster
/// consumes its admin log; everything else idles with its state intact.
pub trait LeaderOracle: Send + Sync + 'static {
    /// Current leadership state plus change notifications.
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn is_leader(&self) -> bool {
        *self.subscribe().borrow()
    }
}

/// Leadership driven by explicit calls instead of an election service. Used in
/// tests and in single-controller deployments where this process is always the
/// leader.
pub struct StaticLeaderOracle {
    sender: watch::Sender<bool>,
}

impl StaticLeaderOracle {
    pub fn new(is_leader: bool) -> Self {
        Self {
            sender: watch::channel(is_leader).0,
        }
    }

    pub fn leader() -> Self {
        Self::new(true)
    }

    pub fn follower() -> Self {
        Self::new(false)
    }

    pub fn set_leader(&self, is_leader: bool) {
        self.sender.send_replace(is_leader);
    }
}

impl LeaderOracle for StaticLeaderOracle {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

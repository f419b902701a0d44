//! In-process fan-out over named channels.
//!
//! Each [`Channel`] is backed by its own `tokio::sync::broadcast` channel, so
//! a listener on one channel never sees another channel's traffic. Publishing
//! never waits on subscribers: a subscriber that falls more than `capacity`
//! messages behind loses the oldest ones and logs how many it missed.

use protocol::{Channel, FeedMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

pub type SharedMessage = Arc<FeedMessage>;

pub struct Broadcaster {
    senders: HashMap<Channel, broadcast::Sender<SharedMessage>>,
}

/// A live registration on one channel; dropping it unsubscribes
pub struct Subscription {
    id: Uuid,
    channel: Channel,
    receiver: broadcast::Receiver<SharedMessage>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let senders = Channel::ALL
            .into_iter()
            .map(|channel| {
                let (sender, _) = broadcast::channel(capacity.max(1));
                (channel, sender)
            })
            .collect();
        Self { senders }
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<SharedMessage> {
        // Every channel is created in `new`
        &self.senders[&channel]
    }

    pub fn subscribe(&self, channel: Channel) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            channel,
            receiver: self.sender(channel).subscribe(),
        };
        debug!(channel = %channel, id = %subscription.id, "Subscriber joined");
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        debug!(
            channel = %subscription.channel,
            id = %subscription.id,
            "Subscriber left"
        );
        drop(subscription);
    }

    /// Deliver `message` to everyone subscribed to `channel` right now.
    ///
    /// Returns the number of subscribers reached; zero subscribers is not an error.
    pub fn publish(&self, channel: Channel, message: FeedMessage) -> usize {
        // SendError only means there are no receivers
        self.sender(channel).send(Arc::new(message)).unwrap_or(0)
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.sender(channel).receiver_count()
    }
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Next message, skipping over anything lost to lag.
    ///
    /// `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<SharedMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(dropped)) => {
                    warn!(
                        channel = %self.channel,
                        id = %self.id,
                        dropped,
                        "Subscriber lagging, messages dropped"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<SharedMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(dropped)) => {
                    warn!(channel = %self.channel, id = %self.id, dropped, "Subscriber lagging, messages dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

use super::{SensorEvent, SensorSource};
use tokio::sync::broadcast;

/// Fan-out point for sensor events.
///
/// Cloning is cheap, every clone publishes into the same channel. Subscribers that
/// fall behind lose the oldest events, sensors produce fresh samples anyway.
#[derive(Debug, Clone)]
pub struct SensorHub {
    sender: broadcast::Sender<SensorEvent>,
}

impl Default for SensorHub {
    fn default() -> Self { Self::new() }
}

impl SensorHub {
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(Self::CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Returns the number of subscribers that will see it.
    pub fn publish(&self, event: SensorEvent) -> usize { self.sender.send(event).unwrap_or(0) }

    pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }

    /// Subscribes to all events of the given family.
    pub fn subscribe(&self, source: SensorSource) -> SensorSubscription {
        SensorSubscription { receiver: self.sender.subscribe(), source }
    }
}

/// Receiving end of a [`SensorHub`] filtered to one sensor family.
#[derive(Debug)]
pub struct SensorSubscription {
    receiver: broadcast::Receiver<SensorEvent>,
    source: SensorSource,
}

impl SensorSubscription {
    pub fn source(&self) -> SensorSource { self.source }

    /// Waits for the next matching event, `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SensorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.is_for(self.source) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    crate::event!("Sensor subscription lagged, {n} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

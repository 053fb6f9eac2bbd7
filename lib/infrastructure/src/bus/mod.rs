use tokio::sync::broadcast::{self, error::RecvError};

/// Fan-out of application events to any number of listeners.
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

pub struct EventListener<T> {
    rx: broadcast::Receiver<T>,
}

#[derive(Clone)]
pub struct EventEmitter<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> EventBus<T> {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventListener<T> {
        EventListener { rx: self.tx.subscribe() }
    }

    pub fn emitter(&self) -> EventEmitter<T> {
        EventEmitter { tx: self.tx.clone() }
    }
}

impl<T: Clone> EventListener<T> {
    /// Waits for the next event. Lagging listeners skip the dropped events
    /// and continue with the oldest retained one; `None` means the bus is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Closed) => {
                    tracing::error!("Channel for event receiver of {} is closed", std::any::type_name::<T>());
                    return None;
                }
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(
                        "Channel for event receiver of {} lagged by {} messages",
                        std::any::type_name::<T>(),
                        count
                    );
                }
            }
        }
    }
}

impl<T: Clone + std::fmt::Debug> EventEmitter<T> {
    pub fn send(&self, event: T) {
        //nobody subscribed yet
        if self.tx.receiver_count() == 0 {
            tracing::trace!("No listener for event {:?}", event);
            return;
        }

        if let Err(e) = self.tx.send(event) {
            tracing::error!("Error sending event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_receives_emitted_events_in_order() {
        let bus = EventBus::<u32>::new(8);
        let mut listener = bus.subscribe();
        let emitter = bus.emitter();

        emitter.send(1);
        emitter.send(2);

        assert_eq!(listener.recv().await, Some(1));
        assert_eq!(listener.recv().await, Some(2));
    }

    #[tokio::test]
    async fn lagging_listener_continues_with_retained_events() {
        let bus = EventBus::<u32>::new(2);
        let mut listener = bus.subscribe();
        let emitter = bus.emitter();

        for i in 0..5 {
            emitter.send(i);
        }

        assert_eq!(listener.recv().await, Some(3));
        assert_eq!(listener.recv().await, Some(4));
    }
}

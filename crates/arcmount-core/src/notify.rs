/// Fan-out change notifications over bounded crossbeam channels.
///
/// Every subscriber gets its own bounded channel. Publishing never blocks:
/// a full channel drops the message for that subscriber (observers are
/// expected to resynchronise from a fresh snapshot), and a disconnected
/// receiver is pruned on the next publish.
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct Subscribers<T> {
    senders: Mutex<Vec<Sender<T>>>,
    capacity: usize,
}

impl<T: Clone> Subscribers<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Open a new subscription.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = bounded(self.capacity);
        self.senders.lock().push(tx);
        rx
    }

    /// Deliver `message` to every live subscriber.
    pub fn publish(&self, message: &T) {
        let mut senders = self.senders.lock();
        senders.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("notification dropped: subscriber queue full");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let subs = Subscribers::new(8);
        let a = subs.subscribe();
        let b = subs.subscribe();
        subs.publish(&42u32);
        assert_eq!(a.try_recv().unwrap(), 42);
        assert_eq!(b.try_recv().unwrap(), 42);
    }

    #[test]
    fn test_disconnected_subscribers_are_pruned() {
        let subs = Subscribers::new(8);
        let keep = subs.subscribe();
        drop(subs.subscribe());
        subs.publish(&1u8);
        assert_eq!(subs.len(), 1);
        assert_eq!(keep.try_recv().unwrap(), 1);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let subs = Subscribers::new(1);
        let rx = subs.subscribe();
        subs.publish(&1u8);
        subs.publish(&2u8);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.try_recv().is_err());
    }
}

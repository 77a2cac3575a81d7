//! Lighting events
//!
//! Hosts post events from anywhere through an [`EventSender`]; the queue is
//! bounded and drained synchronously at the start of `update`. Nothing is
//! delivered through callbacks.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use umbra_core::LightId;

/// Something the pipeline reacts to on the next update
#[derive(Clone, Debug, PartialEq)]
pub enum LightingEvent {
    /// The light's description changed; cached shadows are stale
    LightModified(LightId),
    /// Drop cached shadows for one light, or every light
    InvalidateShadows(Option<LightId>),
    SetDetailLevels { shadow: i32, indirect: i32 },
    SetDynamics(bool),
    SetIndirect(bool),
}

/// Cloneable producer side of the event queue
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: Sender<LightingEvent>,
}

impl EventSender {
    /// Post an event. Returns false (and logs) when the queue is full.
    pub fn send(&self, event: LightingEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!("lighting event queue full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Bounded event queue owned by the lighting context
#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<LightingEvent>,
    receiver: Receiver<LightingEvent>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn send(&self, event: LightingEvent) -> bool {
        self.sender().send(event)
    }

    /// Take every pending event in arrival order
    pub fn drain(&self) -> Vec<LightingEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_order() {
        let queue = EventQueue::new(8);
        let sender = queue.sender();
        assert!(sender.send(LightingEvent::SetDynamics(false)));
        assert!(queue.send(LightingEvent::InvalidateShadows(None)));
        assert_eq!(queue.len(), 2);

        let events = queue.drain();
        assert_eq!(
            events,
            vec![LightingEvent::SetDynamics(false), LightingEvent::InvalidateShadows(None)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops() {
        let queue = EventQueue::new(1);
        assert!(queue.send(LightingEvent::SetIndirect(true)));
        assert!(!queue.send(LightingEvent::SetIndirect(false)));
        assert_eq!(queue.drain(), vec![LightingEvent::SetIndirect(true)]);
    }

    #[test]
    fn test_sender_from_other_thread() {
        let queue = EventQueue::new(4);
        let sender = queue.sender();
        std::thread::spawn(move || {
            sender.send(LightingEvent::LightModified(LightId::new(3, 1)));
        })
        .join()
        .unwrap();
        assert_eq!(queue.drain(), vec![LightingEvent::LightModified(LightId::new(3, 1))]);
    }
}

use super::BarrierReply;
use log::trace;

/// Collects the barrier replies of a batch of switch writes.
///
/// ```
/// # use flowmon_core::protocol::BarrierHandler;
/// # use std::sync::mpsc;
/// let mut barriers = BarrierHandler::new();
/// let (reply, pending) = mpsc::channel();
/// barriers.send_request(pending);
/// assert_eq!(barriers.pending(), 1);
///
/// reply.send(()).unwrap();
/// barriers.wait_for_replies();
/// assert_eq!(barriers.pending(), 0);
/// ```
#[derive(Debug, Default)]
pub struct BarrierHandler {
    pending: Vec<BarrierReply>,
}

impl BarrierHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_request(&mut self, reply: BarrierReply) {
        self.pending.push(reply);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// block until every pending barrier is answered.
    ///
    /// A switch that disconnects before replying counts as answered.
    pub fn wait_for_replies(&mut self) {
        for reply in self.pending.drain(..) {
            if reply.recv().is_err() {
                trace!("barrier reply dropped, switch disconnected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::mpsc, thread};

    #[test]
    fn disconnected_switch_does_not_block() {
        let mut barriers = BarrierHandler::new();
        let (reply, pending) = mpsc::channel::<()>();
        barriers.send_request(pending);
        drop(reply);

        barriers.wait_for_replies();
        assert_eq!(barriers.pending(), 0);
    }

    #[test]
    fn waits_for_late_replies() {
        let mut barriers = BarrierHandler::new();
        let mut replies = Vec::new();
        for _ in 0..3 {
            let (reply, pending) = mpsc::channel();
            barriers.send_request(pending);
            replies.push(reply);
        }

        let switches = thread::spawn(move || {
            for reply in replies {
                reply.send(()).unwrap();
            }
        });

        barriers.wait_for_replies();
        switches.join().unwrap();
        assert_eq!(barriers.pending(), 0);
    }
}

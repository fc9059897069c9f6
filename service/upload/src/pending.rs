use std::collections::VecDeque;

use domain_upload::model::vo::Part;

/// Holds parts produced before the upload id is known.
///
/// Once released the queue is retired for good and hands every later part
/// back to the caller.
#[derive(Debug)]
pub struct PendingQueue {
    parts: Option<VecDeque<Part>>,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            parts: Some(VecDeque::new()),
        }
    }

    /// Keep the part, or give it back when the queue is retired.
    pub fn offer(&mut self, part: Part) -> Option<Part> {
        match &mut self.parts {
            Some(parts) => {
                parts.push_back(part);
                None
            }
            None => Some(part),
        }
    }

    /// Retire the queue, returning the held parts in arrival order.
    pub fn release(&mut self) -> VecDeque<Part> {
        self.parts.take().unwrap_or_default()
    }

    /// Retire the queue dropping what it holds.
    pub fn discard(&mut self) {
        self.parts = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: u64) -> Part {
        Part {
            number,
            payload: vec![number as u8],
        }
    }

    #[test]
    fn release_keeps_order_and_retires() {
        let mut pending = PendingQueue::new();
        assert!(pending.offer(part(1)).is_none());
        assert!(pending.offer(part(2)).is_none());

        let released: Vec<u64> = pending.release().into_iter().map(|p| p.number).collect();
        assert_eq!(released, vec![1, 2]);

        let back = pending.offer(part(3)).unwrap();
        assert_eq!(back.number, 3);
        assert!(pending.release().is_empty());
    }

    #[test]
    fn discard_drops_parts() {
        let mut pending = PendingQueue::new();
        pending.offer(part(1));
        pending.discard();
        assert_eq!(pending.offer(part(2)).map(|p| p.number), Some(2));
        assert!(pending.release().is_empty());
    }
}

use super::{ActionKind, ScriptError};

/// Every payload is charged in multiples of this many bytes.
pub const PAYLOAD_ALIGN: usize = 16;

pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadHandle(u32);

impl PayloadHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed-budget store for action payloads.
///
/// Payloads live for as long as the arena and are never moved out or freed individually; the
/// budget is accounted in aligned bytes of each payload's inline footprint.
#[derive(Debug)]
pub struct ActionArena {
    payloads: Vec<ActionKind>,
    capacity: usize,
    used: usize,
}

impl ActionArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { payloads: Vec::new(), capacity, used: 0 }
    }

    pub fn allocate(&mut self, payload: ActionKind) -> Result<PayloadHandle, ScriptError> {
        let requested = align_up(payload.footprint(), PAYLOAD_ALIGN);
        let available = self.remaining();
        if requested > available {
            return Err(ScriptError::CapacityExceeded { requested, available });
        }
        let handle = PayloadHandle(self.payloads.len() as u32);
        self.payloads.push(payload);
        self.used += requested;
        Ok(handle)
    }

    pub fn get(&self, handle: PayloadHandle) -> Option<&ActionKind> {
        self.payloads.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::NavigateData;

    fn navigate(next: i32) -> ActionKind {
        ActionKind::Navigate(NavigateData { prev: -1, next, relative: true })
    }

    #[test]
    fn align_up_rounds_to_sixteen() {
        assert_eq!(align_up(0, PAYLOAD_ALIGN), 0);
        assert_eq!(align_up(1, PAYLOAD_ALIGN), 16);
        assert_eq!(align_up(16, PAYLOAD_ALIGN), 16);
        assert_eq!(align_up(33, PAYLOAD_ALIGN), 48);
    }

    #[test]
    fn charges_aligned_footprint() {
        let mut arena = ActionArena::with_capacity(256);
        let payload = navigate(1);
        let charged = align_up(payload.footprint(), PAYLOAD_ALIGN);
        arena.allocate(payload).expect("fits");
        assert_eq!(arena.used(), charged);
        assert_eq!(arena.used() % PAYLOAD_ALIGN, 0);
    }

    #[test]
    fn overflow_is_reported_and_earlier_payloads_survive() {
        let charged = align_up(navigate(0).footprint(), PAYLOAD_ALIGN);
        let mut arena = ActionArena::with_capacity(charged * 2);
        let first = arena.allocate(navigate(1)).expect("first fits");
        arena.allocate(navigate(2)).expect("second fits");
        let err = arena.allocate(navigate(3)).unwrap_err();
        assert_eq!(err, ScriptError::CapacityExceeded { requested: charged, available: 0 });
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(first), Some(&navigate(1)));
    }
}

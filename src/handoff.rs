//! A one-item mailbox.  Setting overwrites whatever is there and never blocks; getting blocks until something has been
//! set since the last get.
//!
//! Only the newest value survives, so this is only suitable for publishing state where the latest value subsumes the
//! earlier ones, such as a monotonically advancing position.
use parking_lot::{Condvar, Mutex};

pub struct Handoff<T> {
    slot: Mutex<Option<T>>,
    filled: Condvar,
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Handoff::new()
    }
}

impl<T> Handoff<T> {
    pub fn new() -> Handoff<T> {
        Handoff {
            slot: Mutex::new(None),
            filled: Condvar::new(),
        }
    }

    pub fn set(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.filled.notify_one();
    }

    pub fn get(&self) -> T {
        let mut slot = self.slot.lock();
        loop {
            if let Some(x) = slot.take() {
                return x;
            }
            self.filled.wait(&mut slot);
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

//! channel.rs
//! Single-slot "latest value wins" state channel between periodic tasks.
//!
//! - put: overwrites the slot, never blocks, drops any unread value
//! - get: copies the slot out, never blocks, never consumes
//! - one writer per channel: `StateWriter` is not `Clone`, `StateReader` is
//!
//! The slot is a crossbeam `AtomicCell<T>` plus an `AtomicBool` marking the
//! first write. Both are native atomics for the bool and i32 signals the
//! cruise tasks exchange. `AtomicCell<Option<T>>` would fall back to
//! crossbeam's global striped lock, so the flag lives beside the value.

use crossbeam::atomic::AtomicCell;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

struct Slot<T> {
    value: AtomicCell<T>,
    written: AtomicBool,
}

/// Producer half. Exactly one per channel; moved into the owning task.
pub struct StateWriter<T> {
    slot: Arc<Slot<T>>,
}

/// Consumer half. Cheap to clone; any number of tasks may read.
pub struct StateReader<T> {
    slot: Arc<Slot<T>>,
}

/// Creates an empty channel and returns its writer and first reader.
pub fn state_channel<T: Copy + Send + Default>() -> (StateWriter<T>, StateReader<T>) {
    let slot = Arc::new(Slot {
        value: AtomicCell::new(T::default()),
        written: AtomicBool::new(false),
    });
    (
        StateWriter { slot: slot.clone() },
        StateReader { slot },
    )
}

/// True when reads and writes of `T` never touch a lock.
pub fn is_lock_free<T: Copy>() -> bool {
    AtomicCell::<T>::is_lock_free()
}

impl<T: Copy + Send + Default> StateWriter<T> {
    /// Publish a new sample, replacing whatever was there.
    #[inline]
    pub fn put(&self, value: T) {
        self.slot.value.store(value);
        self.slot.written.store(true, Ordering::Release);
    }

    /// Hands out another reader on the same slot.
    pub fn reader(&self) -> StateReader<T> {
        StateReader {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Copy + Send + Default> StateReader<T> {
    /// Latest published value, or `default` if nothing was ever written.
    #[inline]
    pub fn get(&self, default: T) -> T {
        self.peek().unwrap_or(default)
    }

    #[inline]
    pub fn peek(&self) -> Option<T> {
        if self.has_value() {
            Some(self.slot.value.load())
        } else {
            None
        }
    }

    pub fn has_value(&self) -> bool {
        self.slot.written.load(Ordering::Acquire)
    }
}

impl<T> Clone for StateReader<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn get_returns_default_before_first_put() {
        let (_tx, rx) = state_channel::<i32>();
        assert_eq!(rx.get(-1), -1);
        assert!(!rx.has_value());
    }

    #[test]
    fn signal_slots_are_lock_free() {
        assert!(is_lock_free::<i32>());
        assert!(is_lock_free::<bool>());
    }

    #[test]
    fn zero_put_is_distinct_from_empty() {
        let (tx, rx) = state_channel::<i32>();
        tx.put(0);
        assert!(rx.has_value());
        assert_eq!(rx.get(-1), 0);
    }

    #[test]
    fn latest_put_wins() {
        let (tx, rx) = state_channel::<i32>();
        tx.put(10);
        tx.put(20);
        tx.put(30);
        assert_eq!(rx.get(0), 30);
    }

    #[test]
    fn get_does_not_consume() {
        let (tx, rx) = state_channel::<bool>();
        tx.put(true);
        assert!(rx.get(false));
        assert!(rx.get(false));
        assert_eq!(rx.peek(), Some(true));
    }

    #[test]
    fn every_reader_sees_the_same_slot() {
        let (tx, rx) = state_channel::<i32>();
        let other = rx.clone();
        let from_writer = tx.reader();
        tx.put(7);
        assert_eq!(rx.get(0), 7);
        assert_eq!(other.get(0), 7);
        assert_eq!(from_writer.get(0), 7);
    }

    #[test]
    fn reader_on_another_thread_observes_last_value() {
        let (tx, rx) = state_channel::<i32>();
        let producer = thread::spawn(move || {
            for v in 0..=1_000 {
                tx.put(v);
            }
        });
        producer.join().unwrap();

        let consumer = thread::spawn(move || rx.get(-1));
        assert_eq!(consumer.join().unwrap(), 1_000);
    }
}

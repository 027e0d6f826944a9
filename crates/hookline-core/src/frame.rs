//! Frame-number keyed callbacks.
//!
//! The render loop reports each frame number it reaches. When a handler is
//! registered for that frame, it is forwarded to the dispatcher like any
//! other event. Entries stay registered after firing; whether a callback is
//! one-shot is decided by whoever registers and removes it.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::host::{Host, HostRef};

/// A handler registered for a specific frame.
pub struct FrameEntry<H: Host> {
    /// The handler to dispatch.
    pub handler: HostRef<H>,
    /// Registration-time payload passed as `user_data`.
    pub user_data: Option<HostRef<H>>,
}

impl<H: Host> Clone for FrameEntry<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            user_data: self.user_data.clone(),
        }
    }
}

struct FrameTable<H: Host> {
    entries: HashMap<u64, FrameEntry<H>>,
    highest_frame: u64,
}

/// Thread-safe table of frame callbacks.
pub(crate) struct FrameCallbacks<H: Host> {
    table: Mutex<FrameTable<H>>,
}

impl<H: Host> FrameCallbacks<H> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(FrameTable {
                entries: HashMap::new(),
                highest_frame: 0,
            }),
        }
    }

    /// Insert or replace the entry for `frame`, returning the replaced one.
    pub fn register(&self, frame: u64, entry: FrameEntry<H>) -> Option<FrameEntry<H>> {
        let mut table = self.table.lock();
        table.highest_frame = table.highest_frame.max(frame);
        table.entries.insert(frame, entry)
    }

    pub fn remove(&self, frame: u64) -> Option<FrameEntry<H>> {
        self.table.lock().entries.remove(&frame)
    }

    /// Remove every entry and reset the highest registered frame.
    pub fn clear(&self) -> Vec<FrameEntry<H>> {
        let mut table = self.table.lock();
        table.highest_frame = 0;
        table.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn highest_frame(&self) -> u64 {
        self.table.lock().highest_frame
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// A fresh reference to the entry for `frame`, if one can fire.
    pub fn lookup(&self, frame: u64) -> Option<FrameEntry<H>> {
        let table = self.table.lock();
        if frame > table.highest_frame {
            return None;
        }
        table.entries.get(&frame).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHost, MockValue};

    fn entry(
        handler: HostRef<MockHost>,
        user_data: Option<HostRef<MockHost>>,
    ) -> FrameEntry<MockHost> {
        FrameEntry { handler, user_data }
    }

    #[test]
    fn test_register_raises_highest_frame() {
        let host = MockHost::new();
        let frames = FrameCallbacks::new();

        frames.register(10, entry(host.handler(0), None));
        frames.register(4, entry(host.handler(0), None));

        assert_eq!(frames.highest_frame(), 10);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_lookup_bounds() {
        let host = MockHost::new();
        let frames = FrameCallbacks::new();
        let handler = host.handler(1);
        frames.register(3, entry(handler.clone(), None));

        assert!(frames.lookup(2).is_none());
        assert!(frames.lookup(4).is_none());
        let entry = frames.lookup(3).expect("frame 3 is registered");
        assert_eq!(entry.handler.get(), handler.get());
        assert!(frames.lookup(3).is_some(), "entries persist after lookup");
    }

    #[test]
    fn test_replace_and_clear_release_references() {
        let host = MockHost::new();
        let frames = FrameCallbacks::new();
        let user = host.owned(MockValue::Int(1));
        let user_raw = *user.get();

        frames.register(1, entry(host.handler(0), Some(user)));
        let replaced = frames.register(1, entry(host.handler(0), None));
        assert!(replaced.is_some());
        drop(replaced);
        assert_eq!(host.refcount(user_raw), 0);

        frames.register(7, entry(host.handler(0), None));
        assert_eq!(frames.clear().len(), 2);
        assert_eq!(frames.highest_frame(), 0);
        assert!(frames.lookup(7).is_none());
    }
}

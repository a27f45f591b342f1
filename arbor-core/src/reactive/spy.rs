//! Dependency recording.
//!
//! While a reactor body runs, the scheduler keeps a recording frame open for
//! it; every tracked read reports the touched address to the innermost
//! frame. Frames nest, so a derived value recomputed in the middle of a
//! reaction records its own reads without polluting the reaction's list.

use smallvec::SmallVec;

use crate::id::{NodeId, ReactorId};

/// A recorded dependency: the node that was read plus the full path of the
/// read, including the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub node: NodeId,
    pub path: String,
}

struct Frame {
    reactor: ReactorId,
    recorded: SmallVec<[Address; 4]>,
}

/// Stack of active recording sessions.
#[derive(Default)]
pub(crate) struct SpyStack {
    frames: Vec<Frame>,
    paused: bool,
}

impl SpyStack {
    pub fn start(&mut self, reactor: ReactorId) {
        self.frames.push(Frame {
            reactor,
            recorded: SmallVec::new(),
        });
    }

    /// Close the session for `reactor` and return what it recorded.
    ///
    /// Frames left open above it (a body that panicked mid-run) are
    /// discarded on the way down.
    pub fn stop(&mut self, reactor: ReactorId) -> SmallVec<[Address; 4]> {
        while let Some(frame) = self.frames.pop() {
            if frame.reactor == reactor {
                return frame.recorded;
            }
        }
        SmallVec::new()
    }

    pub fn record(&mut self, addr: Address) {
        if self.paused {
            return;
        }
        if let Some(top) = self.frames.last_mut() {
            if !top.recorded.contains(&addr) {
                top.recorded.push(addr);
            }
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty() && !self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(node: NodeId, path: &str) -> Address {
        Address {
            node,
            path: path.to_string(),
        }
    }

    #[test]
    fn records_to_innermost_frame_only() {
        let mut spy = SpyStack::default();
        let outer = ReactorId::new();
        let inner = ReactorId::new();
        let n = NodeId::new();

        spy.start(outer);
        spy.record(addr(n, "/a"));
        spy.start(inner);
        spy.record(addr(n, "/b"));
        let inner_deps = spy.stop(inner);
        spy.record(addr(n, "/c"));
        let outer_deps = spy.stop(outer);

        assert_eq!(inner_deps.len(), 1);
        assert_eq!(inner_deps[0].path, "/b");
        let paths: Vec<_> = outer_deps.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, ["/a", "/c"]);
    }

    #[test]
    fn duplicate_reads_record_once() {
        let mut spy = SpyStack::default();
        let r = ReactorId::new();
        let n = NodeId::new();
        spy.start(r);
        spy.record(addr(n, "/x"));
        spy.record(addr(n, "/x"));
        assert_eq!(spy.stop(r).len(), 1);
    }

    #[test]
    fn paused_stack_drops_reads() {
        let mut spy = SpyStack::default();
        let r = ReactorId::new();
        let n = NodeId::new();
        spy.start(r);
        spy.pause();
        assert!(!spy.is_active());
        spy.record(addr(n, "/x"));
        spy.resume();
        spy.record(addr(n, "/y"));
        let deps = spy.stop(r);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].path, "/y");
    }

    #[test]
    fn stop_discards_abandoned_inner_frames() {
        let mut spy = SpyStack::default();
        let outer = ReactorId::new();
        let abandoned = ReactorId::new();
        let n = NodeId::new();
        spy.start(outer);
        spy.record(addr(n, "/kept"));
        spy.start(abandoned);
        spy.record(addr(n, "/lost"));
        let deps = spy.stop(outer);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].path, "/kept");
        assert!(spy.stop(abandoned).is_empty());
    }
}

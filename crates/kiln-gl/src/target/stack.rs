use super::BufferKey;

/// Stack of render buffers; the top is the current draw target.
///
/// The bottom entry is the root surface and is never popped.
#[derive(Debug, Clone)]
pub struct RenderTargetStack {
    stack: Vec<BufferKey>,
}

impl RenderTargetStack {
    pub fn new(root: BufferKey) -> Self {
        Self { stack: vec![root] }
    }

    #[inline]
    pub fn current(&self) -> BufferKey {
        // never empty: `pop` keeps the root
        self.stack[self.stack.len() - 1]
    }

    #[inline]
    pub fn root(&self) -> BufferKey {
        self.stack[0]
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn contains(&self, key: BufferKey) -> bool {
        self.stack.contains(&key)
    }

    /// Pushes `key`. Returns `true` if the current target changed.
    pub fn push(&mut self, key: BufferKey) -> bool {
        let changed = self.current() != key;
        self.stack.push(key);
        changed
    }

    /// Pops the top unless only the root remains.
    ///
    /// Returns the new current target if it differs from the popped one.
    pub fn pop(&mut self) -> Option<BufferKey> {
        if self.stack.len() <= 1 {
            return None;
        }
        let popped = self.stack.pop()?;
        let current = self.current();
        (popped != current).then_some(current)
    }

    /// Drops everything above the root.
    pub fn reset(&mut self) {
        self.stack.truncate(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<BufferKey> {
        let mut map: SlotMap<BufferKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn pop_on_root_is_noop() {
        let k = keys(1);
        let mut stack = RenderTargetStack::new(k[0]);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.current(), k[0]);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn push_reports_target_change() {
        let k = keys(2);
        let mut stack = RenderTargetStack::new(k[0]);
        assert!(stack.push(k[1]));
        assert!(!stack.push(k[1]));
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn pop_returns_previous_target_only_on_change() {
        let k = keys(2);
        let mut stack = RenderTargetStack::new(k[0]);
        stack.push(k[1]);
        stack.push(k[1]);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), Some(k[0]));
        assert_eq!(stack.current(), k[0]);
    }

    #[test]
    fn reset_keeps_root() {
        let k = keys(3);
        let mut stack = RenderTargetStack::new(k[0]);
        stack.push(k[1]);
        stack.push(k[2]);
        stack.reset();
        assert_eq!(stack.current(), k[0]);
        assert_eq!(stack.root(), k[0]);
    }
}

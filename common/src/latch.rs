use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One-shot flag that threads can block on until another thread sets it.
///
/// Once set, a latch stays set. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    inner: Arc<LatchInner>,
}

#[derive(Debug, Default)]
struct LatchInner {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut set = self.inner.set.lock();
        if !*set {
            *set = true;
            self.inner.cond.notify_all();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.inner.set.lock()
    }

    pub fn wait(&self) {
        let mut set = self.inner.set.lock();
        while !*set {
            self.inner.cond.wait(&mut set);
        }
    }

    /// Returns `true` if the latch was set before the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.inner.set.lock();
        if *set {
            return true;
        }
        let _ = self.inner.cond.wait_while_for(&mut set, |set| !*set, timeout);
        *set
    }
}

#[cfg(test)]
mod tests {
    use super::Latch;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn new_latch_is_not_set() {
        let latch = Latch::new();
        assert!(!latch.is_set());
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_completes_after_set_from_other_thread() {
        let latch = Latch::new();
        let waiter = thread::spawn({
            let latch = latch.clone();
            move || latch.wait()
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished(), "wait should block before set");

        latch.set();
        waiter.join().unwrap();
        assert!(latch.is_set());
    }

    #[test]
    fn wait_returns_immediately_when_already_set() {
        let latch = Latch::new();
        latch.set();
        latch.set();

        assert!(latch.wait_timeout(Duration::from_millis(1)));
        latch.wait();
    }
}

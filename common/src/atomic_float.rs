use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free `f64` cell for parameters tuned from another thread.
///
/// Stores the bit pattern in an `AtomicU64`; NaN and signed zero round-trip exactly.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::AtomicF64;
    use std::sync::Arc;

    #[test]
    fn load_returns_stored_value() {
        let cell = AtomicF64::new(1.5);
        assert_eq!(cell.load(), 1.5);
        cell.store(-0.25);
        assert_eq!(cell.load(), -0.25);
    }

    #[test]
    fn nan_round_trips() {
        let cell = AtomicF64::new(f64::NAN);
        assert!(cell.load().is_nan());
    }

    #[test]
    fn store_is_visible_across_threads() {
        let cell = Arc::new(AtomicF64::new(0.0));
        std::thread::spawn({
            let cell = Arc::clone(&cell);
            move || cell.store(7.0)
        })
        .join()
        .unwrap();
        assert_eq!(cell.load(), 7.0);
    }
}

//! Completion signal line registry
//!
//! Maps hardware signal lines (interrupt pins) to the handler that services
//! them. Capacity is fixed at compile time; a line registered twice keeps a
//! single slot and the newer handler.

use crate::lora::traits::RadioError;
use heapless::Vec;

/// Hardware signal line number (board pin)
pub type SignalLine = u8;

/// Fixed-capacity map from signal line to handler
#[derive(Debug)]
pub struct SignalRegistry<H, const N: usize> {
    slots: Vec<(SignalLine, H), N>,
}

impl<H, const N: usize> SignalRegistry<H, N> {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Bind `handler` to `line` and return its slot index.
    ///
    /// Fails with [`RadioError::SignalLinesExhausted`] once all `N` slots hold
    /// other lines.
    pub fn register(&mut self, line: SignalLine, handler: H) -> Result<usize, RadioError> {
        if let Some(slot) = self.slots.iter().position(|(l, _)| *l == line) {
            self.slots[slot].1 = handler;
            return Ok(slot);
        }

        self.slots.push((line, handler)).map_err(|_| {
            log::warn!("no free slot for signal line {}", line);
            RadioError::SignalLinesExhausted
        })?;
        log::debug!("signal line {} registered", line);
        Ok(self.slots.len() - 1)
    }

    /// Handler bound to `line`
    pub fn handler(&self, line: SignalLine) -> Option<&H> {
        self.slots.iter().find(|(l, _)| *l == line).map(|(_, h)| h)
    }

    /// Unbind `line`, returning its handler and freeing the slot
    pub fn release(&mut self, line: SignalLine) -> Option<H> {
        let slot = self.slots.iter().position(|(l, _)| *l == line)?;
        Some(self.slots.swap_remove(slot).1)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }
}

impl<H, const N: usize> Default for SignalRegistry<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry: SignalRegistry<&str, 3> = SignalRegistry::new();

        assert_eq!(registry.register(2, "radio0"), Ok(0));
        assert_eq!(registry.register(5, "radio1"), Ok(1));

        assert_eq!(registry.handler(5), Some(&"radio1"));
        assert_eq!(registry.handler(7), None);
    }

    #[test]
    fn test_exhausted() {
        let mut registry: SignalRegistry<u32, 3> = SignalRegistry::new();
        for line in 0..3 {
            registry.register(line, line as u32).unwrap();
        }

        assert!(registry.is_full());
        assert_eq!(registry.register(9, 9), Err(RadioError::SignalLinesExhausted));
    }

    #[test]
    fn test_same_line_reuses_slot() {
        let mut registry: SignalRegistry<u32, 1> = SignalRegistry::new();

        assert_eq!(registry.register(4, 1), Ok(0));
        assert_eq!(registry.register(4, 2), Ok(0));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handler(4), Some(&2));
    }

    #[test]
    fn test_release_frees_slot() {
        let mut registry: SignalRegistry<u32, 1> = SignalRegistry::new();
        registry.register(4, 1).unwrap();

        assert_eq!(registry.release(4), Some(1));
        assert_eq!(registry.release(4), None);
        assert!(registry.is_empty());
        assert_eq!(registry.register(6, 3), Ok(0));
    }
}

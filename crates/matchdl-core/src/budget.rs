//! Per-run remote call budget.
//!
//! Every remote call (discovery query, match fetch, parse request, patch
//! lookup) is paid for up front. The counter never passes the ceiling, so a
//! run issues at most `ceiling` calls no matter where it stops.

/// Counts remote calls against a ceiling for one run. Never persisted.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    ceiling: u32,
    used: u32,
}

impl BudgetTracker {
    pub const DEFAULT_CEILING: u32 = 1800;

    pub fn new(ceiling: u32) -> Self {
        Self { ceiling, used: 0 }
    }

    /// Pay for `n` calls. Returns false (and charges nothing) if that would pass the ceiling.
    pub fn consume(&mut self, n: u32) -> bool {
        if n > self.remaining() {
            return false;
        }
        self.used += n;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_consume_until_exhausted() {
        let mut budget = BudgetTracker::new(3);
        assert_eq!(budget.remaining(), 3);
        assert!(budget.consume(1));
        assert!(budget.consume(2));
        assert!(budget.is_exhausted());
        assert!(!budget.consume(1));
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn refused_consume_charges_nothing() {
        let mut budget = BudgetTracker::new(2);
        assert!(!budget.consume(3));
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.remaining(), 2);
    }

    #[test]
    fn zero_ceiling_is_exhausted_from_start() {
        let mut budget = BudgetTracker::new(0);
        assert!(budget.is_exhausted());
        assert!(!budget.consume(1));
    }

    #[test]
    fn default_ceiling() {
        assert_eq!(BudgetTracker::default().ceiling(), 1800);
    }
}

//! Inventory-aware acceptance threshold.
//!
//! Thin markets rarely show large discounts simply because there are few
//! listings to compare against, so neighborhoods below the inventory
//! breakpoint use a lower bar.

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    /// Discount percent required in well-stocked neighborhoods
    pub base_threshold: f64,
    /// Discount percent required below the breakpoint
    pub low_inventory_threshold: f64,
    /// Active-listing count at which the base threshold applies
    pub inventory_breakpoint: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            base_threshold: 15.0,
            low_inventory_threshold: 10.0,
            inventory_breakpoint: 200,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(base_threshold: f64, low_inventory_threshold: f64, inventory_breakpoint: usize) -> Self {
        Self {
            base_threshold,
            low_inventory_threshold,
            inventory_breakpoint,
        }
    }

    pub fn threshold_for(&self, active_count: usize) -> f64 {
        if active_count < self.inventory_breakpoint {
            self.low_inventory_threshold
        } else {
            self.base_threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_inventory_uses_lower_bar() {
        let policy = ThresholdPolicy::new(15.0, 10.0, 200);
        assert_eq!(policy.threshold_for(50), 10.0);
        assert_eq!(policy.threshold_for(500), 15.0);
    }

    #[test]
    fn test_breakpoint_is_inclusive_of_base() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.threshold_for(199), 10.0);
        assert_eq!(policy.threshold_for(200), 15.0);
        assert_eq!(policy.threshold_for(0), 10.0);
    }
}

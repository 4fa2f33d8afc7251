//! Retention-bounds check: the effective retention days must lie
//! within `[min, max]` configured globally or per classification.

use crate::error::ComplianceError;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RetentionBounds {
    pub min_days: u32,
    pub max_days: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    pub global: Option<RetentionBounds>,
    pub by_classification: HashMap<String, RetentionBounds>,
}

impl RetentionPolicy {
    pub fn check(&self, retention_days: u32, classification: &str) -> Result<(), ComplianceError> {
        let bounds = self
            .by_classification
            .get(classification)
            .or(self.global.as_ref());

        let Some(bounds) = bounds else {
            return Ok(());
        };

        if retention_days < bounds.min_days || retention_days > bounds.max_days {
            return Err(ComplianceError::RetentionOutOfBounds {
                actual: retention_days,
                min: bounds.min_days,
                max: bounds.max_days,
                classification: classification.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_bounds_passes() {
        let policy = RetentionPolicy { global: Some(RetentionBounds { min_days: 30, max_days: 3650 }), ..Default::default() };
        assert!(policy.check(90, "standard").is_ok());
    }

    #[test]
    fn below_minimum_fails() {
        let policy = RetentionPolicy { global: Some(RetentionBounds { min_days: 30, max_days: 3650 }), ..Default::default() };
        assert!(policy.check(10, "standard").is_err());
    }

    #[test]
    fn classification_override_takes_precedence() {
        let mut by_classification = HashMap::new();
        by_classification.insert("pii".to_string(), RetentionBounds { min_days: 365, max_days: 2555 });
        let policy = RetentionPolicy {
            global: Some(RetentionBounds { min_days: 30, max_days: 3650 }),
            by_classification,
        };
        assert!(policy.check(90, "pii").is_err());
        assert!(policy.check(400, "pii").is_ok());
    }

    #[test]
    fn no_configured_bounds_always_passes() {
        let policy = RetentionPolicy::default();
        assert!(policy.check(1, "anything").is_ok());
    }
}

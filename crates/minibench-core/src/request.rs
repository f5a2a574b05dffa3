//! Normalized validation requests.

use minibench_store::{AccelerationSettings, BenchmarkEvent, RequestId, SettingsDigest};
use serde::{Deserialize, Serialize};

/// One settings value as handed to an engine.
///
/// Owns its settings, so neither the engine nor the reconciler depends on
/// the caller's buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub id: RequestId,
    pub settings: AccelerationSettings,
    pub digest: SettingsDigest,
}

impl ValidationRequest {
    pub fn new(settings: AccelerationSettings) -> Self {
        let digest = settings.digest();
        Self {
            id: RequestId::new(),
            settings,
            digest,
        }
    }

    /// Structural match against the settings embedded in `event`.
    pub fn matches(&self, event: &BenchmarkEvent) -> bool {
        self.settings == event.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minibench_store::{BenchmarkResult, Delegate};

    #[test]
    fn test_new_assigns_distinct_ids_for_equal_settings() {
        let settings = AccelerationSettings::new(Delegate::Gpu);
        let a = ValidationRequest::new(settings.clone());
        let b = ValidationRequest::new(settings);
        assert_ne!(a.id, b.id);
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn test_matches_is_structural() {
        let request = ValidationRequest::new(AccelerationSettings::new(Delegate::Gpu).with_threads(2));
        let same = BenchmarkEvent::success(
            AccelerationSettings::new(Delegate::Gpu).with_threads(2),
            BenchmarkResult::default(),
            0,
            0,
        );
        let other = BenchmarkEvent::success(
            AccelerationSettings::new(Delegate::Gpu).with_threads(4),
            BenchmarkResult::default(),
            0,
            0,
        );
        assert!(request.matches(&same));
        assert!(!request.matches(&other));
    }
}

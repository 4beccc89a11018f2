//! Consumed oracle: user-agent string classification.
//!
//! The actual parsing is out of scope (spec.md §1) — this crate only
//! defines the contract the tracker needs and the default-filling rule
//! it applies to whatever the classifier returns.

use async_trait::async_trait;
use serde_json::json;

/// Classifies a raw user-agent header into browser/OS/device/CPU facts.
/// Implementations may be a bundled parsing library, a call out to a
/// separate service, or (for tests and demos) a fixed answer.
#[async_trait]
pub trait UaClassifier: Send + Sync {
    async fn classify(&self, user_agent: &str) -> UaClassification;
}

/// Raw classifier output. Every field is optional — the tracker, not the
/// classifier, is responsible for filling in defaults (see
/// [`UaClassification::to_metadata`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UaClassification {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device: Option<String>,
    pub device_type: Option<String>,
    pub cpu: Option<String>,
}

impl UaClassification {
    /// Builds the `metadata` object attached to a newly created
    /// FINGERPRINT node. Missing fields default to `"Unknown"`, except
    /// `deviceType` which defaults to `"desktop"` (spec.md §4.3).
    pub fn to_metadata(&self) -> serde_json::Value {
        json!({
            "browser": self.browser.clone().unwrap_or_else(|| "Unknown".to_string()),
            "browserVersion": self.browser_version.clone().unwrap_or_else(|| "Unknown".to_string()),
            "os": self.os.clone().unwrap_or_else(|| "Unknown".to_string()),
            "osVersion": self.os_version.clone().unwrap_or_else(|| "Unknown".to_string()),
            "device": self.device.clone().unwrap_or_else(|| "Unknown".to_string()),
            "deviceType": self.device_type.clone().unwrap_or_else(|| "desktop".to_string()),
            "cpu": self.cpu.clone().unwrap_or_else(|| "Unknown".to_string()),
        })
    }
}

/// Classifier that never recognizes anything; every field falls through
/// to the tracker's defaults. Useful where no real UA parser is wired in
/// (tests, the demo CLI).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUaClassifier;

#[async_trait]
impl UaClassifier for NoopUaClassifier {
    async fn classify(&self, _user_agent: &str) -> UaClassification {
        UaClassification::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_unknown_except_device_type() {
        let metadata = UaClassification::default().to_metadata();
        assert_eq!(metadata["browser"], "Unknown");
        assert_eq!(metadata["deviceType"], "desktop");
    }

    #[tokio::test]
    async fn noop_classifier_returns_empty_classification() {
        let classification = NoopUaClassifier.classify("Mozilla/5.0").await;
        assert_eq!(classification, UaClassification::default());
    }
}

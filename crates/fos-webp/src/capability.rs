//! WebP Capability Model
//!
//! Feature flags describing which WebP sub-formats the host can decode.

use serde::{Deserialize, Serialize};
use std::fmt;

/// WebP sub-features detected by the capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebpFeature {
    /// VP8 lossy bitstream
    Lossy,
    /// VP8L lossless bitstream
    Lossless,
    /// Extended format with an ALPH chunk
    Alpha,
    /// Extended format with ANIM/ANMF chunks
    Animation,
}

impl WebpFeature {
    /// Every feature, in probe order
    pub const ALL: [WebpFeature; 4] = [
        WebpFeature::Lossy,
        WebpFeature::Lossless,
        WebpFeature::Alpha,
        WebpFeature::Animation,
    ];

    /// Key used in the persisted JSON layout
    pub fn key(self) -> &'static str {
        match self {
            Self::Lossy => "lossy",
            Self::Lossless => "lossless",
            Self::Alpha => "alpha",
            Self::Animation => "animation",
        }
    }

    /// Parse a persisted key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for WebpFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Probe results per feature
///
/// A field is `None` until the probe for that feature has settled. Results
/// are persisted as they arrive, so a stored value may be partial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lossy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lossless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<bool>,
}

impl CapabilityResult {
    /// Empty result, nothing probed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Result with every feature set to `supported`
    pub fn uniform(supported: bool) -> Self {
        Self {
            lossy: Some(supported),
            lossless: Some(supported),
            alpha: Some(supported),
            animation: Some(supported),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, feature: WebpFeature, supported: bool) -> Self {
        self.set(feature, supported);
        self
    }

    /// Probe outcome for a feature, `None` while unknown
    pub fn get(&self, feature: WebpFeature) -> Option<bool> {
        match feature {
            WebpFeature::Lossy => self.lossy,
            WebpFeature::Lossless => self.lossless,
            WebpFeature::Alpha => self.alpha,
            WebpFeature::Animation => self.animation,
        }
    }

    /// Record a probe outcome
    pub fn set(&mut self, feature: WebpFeature, supported: bool) {
        let slot = match feature {
            WebpFeature::Lossy => &mut self.lossy,
            WebpFeature::Lossless => &mut self.lossless,
            WebpFeature::Alpha => &mut self.alpha,
            WebpFeature::Animation => &mut self.animation,
        };
        *slot = Some(supported);
    }

    /// Whether the feature is known to be supported
    pub fn supports(&self, feature: WebpFeature) -> bool {
        self.get(feature).unwrap_or(false)
    }

    /// Whether the feature has been probed
    pub fn is_known(&self, feature: WebpFeature) -> bool {
        self.get(feature).is_some()
    }

    /// All four features have settled
    pub fn is_complete(&self) -> bool {
        WebpFeature::ALL.iter().all(|f| self.is_known(*f))
    }

    /// No feature has settled yet
    pub fn is_empty(&self) -> bool {
        WebpFeature::ALL.iter().all(|f| !self.is_known(*f))
    }

    /// Features still waiting for a probe
    pub fn missing(&self) -> Vec<WebpFeature> {
        WebpFeature::ALL
            .into_iter()
            .filter(|f| !self.is_known(*f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_keys() {
        assert_eq!(WebpFeature::Lossy.key(), "lossy");
        assert_eq!(WebpFeature::from_key("alpha"), Some(WebpFeature::Alpha));
        assert_eq!(WebpFeature::from_key("jpeg"), None);
    }

    #[test]
    fn test_partial_result() {
        let result = CapabilityResult::new().with(WebpFeature::Lossy, true);

        assert!(result.supports(WebpFeature::Lossy));
        assert!(!result.supports(WebpFeature::Alpha));
        assert!(!result.is_known(WebpFeature::Alpha));
        assert!(!result.is_complete());
        assert_eq!(result.missing().len(), 3);
    }

    #[test]
    fn test_persisted_layout() {
        let result = CapabilityResult::uniform(true).with(WebpFeature::Animation, false);
        let json = serde_json::to_string(&result).unwrap();

        assert_eq!(
            json,
            r#"{"lossy":true,"lossless":true,"alpha":true,"animation":false}"#
        );
    }

    #[test]
    fn test_partial_layout_omits_unknown() {
        let result = CapabilityResult::new().with(WebpFeature::Alpha, false);
        assert_eq!(serde_json::to_string(&result).unwrap(), r#"{"alpha":false}"#);

        let parsed: CapabilityResult = serde_json::from_str(r#"{"lossy":true}"#).unwrap();
        assert_eq!(parsed.lossy, Some(true));
        assert_eq!(parsed.lossless, None);
    }
}

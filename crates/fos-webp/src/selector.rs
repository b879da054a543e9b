//! Source Selector
//!
//! Decides which URL a WebP image element renders, given its primary source,
//! an optional WebP alternative and the current capability state.

use crate::capability::{CapabilityResult, WebpFeature};

/// 1x1 fully transparent PNG rendered while capability is unknown
pub const PLACEHOLDER_SRC: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Source chosen for one render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualSource<'a> {
    /// The conventional-format source
    Primary(&'a str),
    /// The WebP alternative
    Webp(&'a str),
    /// Capability needed for the decision is unknown; a probe is required
    Placeholder,
}

impl<'a> ActualSource<'a> {
    /// URL to put in `src`
    pub fn url(&self) -> &'a str {
        match self {
            Self::Primary(url) | Self::Webp(url) => url,
            Self::Placeholder => PLACEHOLDER_SRC,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// The element must ask for a probe before it can show a real source
    pub fn needs_probe(&self) -> bool {
        self.is_placeholder()
    }
}

/// Feature that decides whether `src_webp` can be shown
///
/// Alternatives for PNG sources (URL ending in `.png`) need alpha fidelity;
/// everything else only needs lossy decoding.
pub fn required_feature(src_webp: &str) -> WebpFeature {
    if src_webp.ends_with(".png") {
        WebpFeature::Alpha
    } else {
        WebpFeature::Lossy
    }
}

/// Pick the source to render
///
/// An empty `src_webp` counts as no alternative.
pub fn select_source<'a>(
    src: &'a str,
    src_webp: Option<&'a str>,
    capability: Option<&CapabilityResult>,
) -> ActualSource<'a> {
    let Some(webp) = src_webp.filter(|s| !s.is_empty()) else {
        return ActualSource::Primary(src);
    };

    let feature = required_feature(webp);
    match capability.and_then(|c| c.get(feature)) {
        None => ActualSource::Placeholder,
        Some(true) => ActualSource::Webp(webp),
        Some(false) => ActualSource::Primary(src),
    }
}

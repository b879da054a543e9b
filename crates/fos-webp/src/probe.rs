//! Format Capability Probe
//!
//! Detects WebP sub-feature support empirically: each feature has a tiny
//! reference image which is handed to the decoder. A feature is supported
//! when its sample decodes to a non-empty image.

use crate::capability::WebpFeature;
use crate::decoder::{DecodeError, Dimensions, SourceDecoder};

/// 1x1 lossy (VP8) sample
const LOSSY_SAMPLE: &str = "UklGRiIAAABXRUJQVlA4IBYAAAAwAQCdASoBAAEADsD+JaQAA3AAAAAA";

/// 1x1 lossless (VP8L) sample
const LOSSLESS_SAMPLE: &str = "UklGRhoAAABXRUJQVlA4TA0AAAAvAAAAEAcQERGIiP4HAA==";

/// 1x1 extended sample with an ALPH chunk
const ALPHA_SAMPLE: &str = "UklGRkoAAABXRUJQVlA4WAoAAAAQAAAAAAAAAAAAQUxQSAwAAAARBxAR/Q9ERP8DAABWUDggGAAAABQBAJ0BKgEAAQAAAP4AAA3AAP7mtQAAAA==";

/// Single-frame animation (VP8X + ANIM + ANMF)
const ANIMATION_SAMPLE: &str = "UklGRlIAAABXRUJQVlA4WAoAAAASAAAAAAAAAAAAQU5JTQYAAAD/////AABBTk1GJgAAAAAAAAAAAAAAAAAAAGQAAABWUDhMDQAAAC8AAAAQBxAREYiI/gcA";

impl WebpFeature {
    /// Base64 payload of the reference image
    pub fn sample(self) -> &'static str {
        match self {
            Self::Lossy => LOSSY_SAMPLE,
            Self::Lossless => LOSSLESS_SAMPLE,
            Self::Alpha => ALPHA_SAMPLE,
            Self::Animation => ANIMATION_SAMPLE,
        }
    }

    /// Reference image as a `data:` source
    pub fn sample_uri(self) -> String {
        format!("data:image/webp;base64,{}", self.sample())
    }
}

/// How a single probe settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Sample decoded to a non-empty image
    Decoded(Dimensions),
    /// Sample decoded but reported a zero width or height
    Empty(Dimensions),
    /// Decoder rejected the sample
    Failed(DecodeError),
}

impl ProbeOutcome {
    /// Classify a decoder result
    pub fn from_decode(result: Result<Dimensions, DecodeError>) -> Self {
        match result {
            Ok(dims) if dims.is_renderable() => Self::Decoded(dims),
            Ok(dims) => Self::Empty(dims),
            Err(e) => Self::Failed(e),
        }
    }

    /// Whether the probed feature counts as supported
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }
}

/// Probe a single feature synchronously
pub fn probe_feature(decoder: &dyn SourceDecoder, feature: WebpFeature) -> ProbeOutcome {
    let outcome = ProbeOutcome::from_decode(decoder.decode(&feature.sample_uri()));

    match &outcome {
        ProbeOutcome::Decoded(dims) => {
            tracing::debug!("WebP {} supported ({}x{})", feature, dims.width, dims.height);
        }
        ProbeOutcome::Empty(dims) => {
            tracing::debug!(
                "WebP {} decoded to an empty image ({}x{}), treating as unsupported",
                feature, dims.width, dims.height
            );
        }
        ProbeOutcome::Failed(e) => {
            tracing::debug!("WebP {} unsupported: {}", feature, e);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_uri::DataUri;
    use crate::decoder::{ImageDecoder, ImageFormat};

    struct FixedDecoder(Result<Dimensions, DecodeError>);

    impl SourceDecoder for FixedDecoder {
        fn decode(&self, _src: &str) -> Result<Dimensions, DecodeError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_samples_are_webp() {
        for feature in WebpFeature::ALL {
            let uri = DataUri::parse(&feature.sample_uri()).unwrap();
            assert_eq!(uri.mime_type, "image/webp");
            assert_eq!(ImageFormat::from_bytes(&uri.data), ImageFormat::WebP, "{}", feature);
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert!(ProbeOutcome::from_decode(Ok(Dimensions::new(1, 1))).is_supported());
        assert_eq!(
            ProbeOutcome::from_decode(Ok(Dimensions::new(0, 1))),
            ProbeOutcome::Empty(Dimensions::new(0, 1))
        );
        assert!(!ProbeOutcome::from_decode(Err(DecodeError::UnsupportedFormat)).is_supported());
    }

    #[test]
    fn test_empty_decode_is_unsupported() {
        let decoder = FixedDecoder(Ok(Dimensions::new(1, 0)));
        assert!(!probe_feature(&decoder, WebpFeature::Alpha).is_supported());
    }

    #[test]
    fn test_image_decoder_lossless() {
        let outcome = probe_feature(&ImageDecoder::new(), WebpFeature::Lossless);
        assert_eq!(outcome, ProbeOutcome::Decoded(Dimensions::new(1, 1)));
    }
}

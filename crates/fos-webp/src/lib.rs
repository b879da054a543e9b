//! fOS WebP Image
//!
//! An image element that serves a WebP alternative when the host decodes
//! WebP and falls back to the conventional source otherwise.
//!
//! Support for each WebP sub-feature (lossy, lossless, alpha, animation) is
//! probed once by decoding tiny reference images, memoized per profile in
//! origin-scoped storage and shared by every element through a
//! [`CapabilityService`].
//!
//! # Example
//! ```rust,ignore
//! use fos_webp::{CapabilityService, ImageWebp, ImageWebpProps};
//!
//! let service = CapabilityService::in_memory();
//! let mut element = ImageWebp::new(service, ImageWebpProps::new("a.jpg").webp("a.webp"));
//!
//! let first = element.render();          // placeholder until probed
//! if element.mount() {
//!     smol::block_on(element.capability_ready());
//! }
//! let img = element.render();            // "a.webp" or "a.jpg"
//! ```

mod cache;
mod capability;
mod config;
mod data_uri;
mod decoder;
mod element;
mod events;
mod probe;
mod selector;
mod service;
mod storage;

pub use cache::{CacheError, CapabilityCache, DEFAULT_STORAGE_KEY};
pub use capability::{CapabilityResult, WebpFeature};
pub use config::{CapabilityConfig, ENV_ORIGIN, ENV_PROFILE, ENV_STORAGE_KEY};
pub use data_uri::{DataUri, DataUriError};
pub use decoder::{DecodeError, Dimensions, ImageDecoder, ImageFormat, SourceDecoder};
pub use element::{ImageWebp, ImageWebpProps, ImgElement, InlineStyle};
pub use events::{EventHandler, ImageEvent, ImageEventType};
pub use probe::{ProbeOutcome, probe_feature};
pub use selector::{ActualSource, PLACEHOLDER_SRC, required_feature, select_source};
pub use service::{CapabilityService, ProbePhase};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, normalize_origin};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

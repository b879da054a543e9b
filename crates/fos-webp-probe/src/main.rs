//! fOS WebP Probe - Capability cache inspector
//!
//! Usage:
//!   fos-webp-probe probe [--force]       run the probe unless cached, print JSON
//!   fos-webp-probe show                  print the cached result
//!   fos-webp-probe clear                 forget the cached result
//!   fos-webp-probe select <src> [webp]   print the source an element would show
//!
//! The profile is taken from `FOS_WEBP_PROFILE`, the origin from
//! `FOS_WEBP_ORIGIN` and the storage key from `FOS_WEBP_STORAGE_KEY`.

use anyhow::{Context, Result, bail};
use fos_webp::{CapabilityConfig, CapabilityService, ENV_PROFILE, ImageWebp, ImageWebpProps};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("probe");

    let config = CapabilityConfig::from_env();
    if config.profile_dir.is_none() {
        tracing::warn!("{} not set, results will not outlive this process", ENV_PROFILE);
    }
    tracing::debug!("Using {:?}", config);

    let service = CapabilityService::from_config(&config)
        .with_context(|| format!("opening capability storage for {}", config.origin))?;

    match command {
        "probe" => {
            if args.iter().any(|a| a == "--force") {
                service.clear().context("clearing cached capability")?;
            }
            let result = smol::block_on(service.ready());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "show" => match service.load().context("reading cached capability")? {
            Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            None => println!("unknown"),
        },
        "clear" => {
            service.clear().context("clearing cached capability")?;
            tracing::info!("Cleared WebP capability for {}", config.origin);
        }
        "select" => {
            let Some(src) = args.get(1) else {
                bail!("usage: fos-webp-probe select <src> [src-webp]");
            };
            let mut props = ImageWebpProps::new(src.as_str());
            if let Some(webp) = args.get(2) {
                props = props.webp(webp.as_str());
            }

            let mut element = ImageWebp::new(service, props);
            element.render();
            if element.mount() {
                smol::block_on(element.capability_ready());
            }
            println!("{}", element.render().to_html());
        }
        other => bail!("unknown command {other:?} (expected probe, show, clear or select)"),
    }

    Ok(())
}

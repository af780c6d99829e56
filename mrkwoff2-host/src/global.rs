//! Process-wide codec.
//!
//! The free functions here share one [`Woff2Codec`] for the whole process.
//! It is configured from [`set_global_config`] if that ran first, otherwise
//! from the environment ([`BridgeConfig::from_env`]). The module itself is
//! still loaded lazily on the first operation.

use crate::config::BridgeConfig;
use mrkwoff2_core::error::{Result, Woff2Error};
use mrkwoff2_core::Woff2Codec;
use std::sync::OnceLock;

static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();
static CODEC: OnceLock<Woff2Codec> = OnceLock::new();

/// Configure the process-wide codec.
///
/// Must run before the first call to [`global_codec`] or any of the free
/// functions, and only once.
pub fn set_global_config(config: BridgeConfig) -> Result<()> {
    if CODEC.get().is_some() {
        return Err(already_configured("the global codec is already in use"));
    }
    CONFIG
        .set(config)
        .map_err(|_| already_configured("the global codec is already configured"))
}

fn already_configured(cause: &str) -> Woff2Error {
    Woff2Error::Config {
        key: "global".to_string(),
        cause: cause.to_string(),
    }
}

/// The process-wide codec, created on first use.
///
/// Configuration errors are returned on every call until fixed; module load
/// errors are memoized by the codec itself.
pub fn global_codec() -> Result<&'static Woff2Codec> {
    if let Some(codec) = CODEC.get() {
        return Ok(codec);
    }

    let config = match CONFIG.get() {
        Some(config) => config.clone(),
        None => BridgeConfig::from_env()?,
    };
    let loader = config.into_loader()?;
    Ok(CODEC.get_or_init(|| Woff2Codec::new(loader)))
}

/// Compress a TTF font to WOFF2 with the process-wide codec.
pub async fn compress_woff2(input: &[u8]) -> Result<Vec<u8>> {
    global_codec()?.compress(input).await
}

/// Decompress a WOFF2 font to TTF with the process-wide codec.
pub async fn decompress_woff2(input: &[u8]) -> Result<Vec<u8>> {
    global_codec()?.decompress(input).await
}

/// Describe a WOFF2 font with the process-wide codec.
pub async fn info_woff2(input: &[u8]) -> Result<String> {
    global_codec()?.info(input).await
}

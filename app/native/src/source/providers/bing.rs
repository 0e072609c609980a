//! Bing "image of the day" provider.
//!
//! Queries the public `HPImageArchive.aspx` endpoint for the last eight daily
//! images of a market, picks one, and downloads its full-size bytes.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::metamodel::{
    ConfigValue, ConfigurationItemDescriptor, DurationUnit, MetaModelError, PropertyDeclaration,
    SourceConfiguration, ValueType, copy_values,
};
use crate::source::{
    FetchError, FetchImage, FetchedImage, ImageSource, License, SourceDescriptor, SourceError,
};

const DEFAULT_BASE_URL: &str = "https://www.bing.com";

/// Number of archive entries requested per fetch.
const ARCHIVE_SIZE: u32 = 8;

const MARKETS: &[&str] = &[
    "en-US", "en-GB", "en-CA", "en-AU", "en-IN", "de-DE", "fr-FR", "es-ES", "it-IT", "ja-JP",
    "pt-BR", "zh-CN",
];

const PICKS: [&str; 2] = ["newest", "random"];

/// Bounds of the request timeout, in seconds.
const TIMEOUT_RANGE: (u64, u64) = (5, 120);
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Settings
// ============================================================================

/// Settings of the Bing provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BingSettings {
    /// Market code, e.g. `en-US`.
    pub market: String,
    /// `newest` or `random`.
    pub pick: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for BingSettings {
    fn default() -> Self {
        Self {
            market: String::from("en-US"),
            pick: String::from("newest"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SourceConfiguration for BingSettings {
    fn declare(&self) -> Vec<PropertyDeclaration> {
        vec![
            PropertyDeclaration::new(
                "market",
                ValueType::Text,
                ConfigurationItemDescriptor::single_choice("Market", 0, MARKETS.iter().copied(), "en-US")
                    .with_help("Regional edition of the image of the day."),
            ),
            PropertyDeclaration::new(
                "pick",
                ValueType::Text,
                ConfigurationItemDescriptor::single_choice("Image", 1, PICKS, "newest"),
            ),
            PropertyDeclaration::new(
                "timeout",
                ValueType::Duration,
                ConfigurationItemDescriptor::duration(
                    "Request timeout",
                    2,
                    TIMEOUT_RANGE,
                    DurationUnit::Seconds,
                    DEFAULT_TIMEOUT_SECS,
                ),
            ),
        ]
    }

    fn get(&self, property: &str) -> Option<ConfigValue> {
        match property {
            "market" => Some(ConfigValue::Text(self.market.clone())),
            "pick" => Some(ConfigValue::Text(self.pick.clone())),
            "timeout" => Some(ConfigValue::Duration(self.timeout)),
            _ => None,
        }
    }

    fn set(&mut self, property: &str, value: ConfigValue) -> Result<(), MetaModelError> {
        match (property, value) {
            ("market", ConfigValue::Text(market)) => self.market = market,
            ("pick", ConfigValue::Text(pick)) => self.pick = pick,
            ("timeout", ConfigValue::Duration(timeout)) => self.timeout = timeout,
            ("market" | "pick", other) => {
                return Err(MetaModelError::type_mismatch(property, ValueType::Text, &other));
            }
            ("timeout", other) => {
                return Err(MetaModelError::type_mismatch(property, ValueType::Duration, &other));
            }
            (unknown, _) => return Err(MetaModelError::UnknownProperty(unknown.to_string())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SourceConfiguration> { Box::new(self.clone()) }
}

// ============================================================================
// Archive response
// ============================================================================

#[derive(Debug, Deserialize)]
struct Archive {
    #[serde(default)]
    images: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArchiveEntry {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    copyright: String,
    #[serde(default, rename = "copyrightlink")]
    copyright_link: Option<String>,
}

/// Splits `"Caption (© Author)"` into caption and credit.
fn split_copyright(copyright: &str) -> (String, Option<String>) {
    match copyright.rfind(" (©") {
        Some(index) => {
            let caption = copyright[..index].trim().to_string();
            let credit = copyright[index + 2..].trim_end_matches(')').trim().to_string();
            (caption, Some(credit))
        }
        None => (copyright.trim().to_string(), None),
    }
}

impl ArchiveEntry {
    fn into_image(self, base_url: &str) -> FetchImage {
        let image_url = if self.url.starts_with("http://") || self.url.starts_with("https://") {
            self.url
        } else {
            format!("{base_url}{}", self.url)
        };

        let (caption, credit) = split_copyright(&self.copyright);
        let title = if self.title.is_empty() { caption.clone() } else { self.title };

        let mut image = FetchImage::new(title).with_image_url(image_url).with_license(License {
            name: String::from("Bing"),
            url: Some(String::from("https://www.bing.com")),
            text: credit,
        });
        if !caption.is_empty() {
            image = image.with_description(caption);
        }
        if let Some(link) = self.copyright_link.filter(|link| !link.is_empty()) {
            image = image.with_page_url(link);
        }
        image
    }
}

// ============================================================================
// Source
// ============================================================================

/// Fetches the Bing image of the day.
#[derive(Debug)]
pub struct BingSource {
    base_url: String,
    client: Client,
    settings: RwLock<BingSettings>,
}

impl Default for BingSource {
    fn default() -> Self { Self::new() }
}

impl BingSource {
    pub const NAME: &'static str = "bing";

    #[must_use]
    pub fn new() -> Self { Self::with_base_url(DEFAULT_BASE_URL) }

    /// Creates a provider talking to another host, used by tests.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to build HTTP client, using defaults");
                Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            settings: RwLock::new(BingSettings::default()),
        }
    }

    fn archive_url(&self, market: &str) -> String {
        format!(
            "{}/HPImageArchive.aspx?format=js&idx=0&n={ARCHIVE_SIZE}&mkt={market}",
            self.base_url
        )
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| FetchError::new("Network error", err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new("Bing", format!("{url} returned HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::new("Network error", err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_entry(&self, settings: &BingSettings) -> Result<ArchiveEntry, FetchError> {
        let body = self.get_bytes(&self.archive_url(&settings.market), settings.timeout).await?;
        let archive: Archive = serde_json::from_slice(&body)
            .map_err(|err| FetchError::new("Bing", format!("Unexpected archive format: {err}")))?;

        if archive.images.is_empty() {
            return Err(FetchError::new("No images", "Bing returned an empty archive"));
        }

        let index = if settings.pick == "random" {
            rand::rng().random_range(0..archive.images.len())
        } else {
            0
        };
        Ok(archive.images[index].clone())
    }
}

#[async_trait]
impl ImageSource for BingSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(Self::NAME, "Bing", "Bing image of the day").with_icon("bing")
    }

    async fn initialize(&self) -> Result<(), SourceError> {
        reqwest::Url::parse(&self.base_url)
            .map(|_| ())
            .map_err(|err| SourceError::initialization(Self::NAME, err))
    }

    fn configuration(&self) -> Option<Box<dyn SourceConfiguration>> {
        Some(self.settings.read().clone_box())
    }

    fn configure(&self, config: Box<dyn SourceConfiguration>) -> Result<(), SourceError> {
        let mut next = self.settings.read().clone();
        copy_values(&mut next, config.as_ref())
            .map_err(|err| SourceError::configuration(Self::NAME, err))?;
        *self.settings.write() = next;
        Ok(())
    }

    async fn fetch_next(&self, cancel: CancellationToken) -> Result<FetchedImage, FetchError> {
        let settings = self.settings.read().clone();

        let entry = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled()),
            entry = self.fetch_entry(&settings) => entry?,
        };

        let image = entry.into_image(&self.base_url);
        let url = image.image_url.clone().unwrap_or_default();

        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled()),
            bytes = self.get_bytes(&url, settings.timeout) => bytes?,
        };

        tracing::debug!(title = %image.title, bytes = bytes.len(), "downloaded Bing image");
        Ok(FetchedImage::new(image, bytes))
    }
}

//! Remote index access used during installation.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use crate::error::ExtenderError;
use crate::id::ExtenderId;
use crate::info::ExtenderInfo;

const SOURCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::source");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Supplies index metadata and archive bytes for a bundle.
#[cfg_attr(test, mockall::automock)]
pub trait BundleSource {
    /// Fetches metadata for the requested version.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::Download`] when the index is unreachable or
    /// answers with an unexpected document.
    fn info(&self, id: &ExtenderId) -> Result<ExtenderInfo, ExtenderError>;

    /// Downloads the archive described by `info`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::Download`] on transport failure.
    fn fetch(&self, info: &ExtenderInfo) -> Result<Vec<u8>, ExtenderError>;
}

/// HTTP index laid out as `<index>/<group>/<project>/<version>`.
#[derive(Debug, Clone)]
pub struct HttpBundleSource {
    index: Url,
    client: Client,
}

impl HttpBundleSource {
    /// Builds a source rooted at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtenderError::Download`] when the HTTP client cannot be
    /// initialised.
    pub fn new(index: Url) -> Result<Self, ExtenderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ExtenderError::Download {
                url: index.to_string(),
                message: error.to_string(),
            })?;
        Ok(Self { index, client })
    }

    fn info_url(&self, id: &ExtenderId) -> Result<Url, ExtenderError> {
        let mut url = self.index.clone();
        url.path_segments_mut()
            .map_err(|()| ExtenderError::Download {
                url: self.index.to_string(),
                message: String::from("index URL cannot be a base"),
            })?
            .pop_if_empty()
            .extend([id.group(), id.project(), id.version()]);
        Ok(url)
    }

    fn get(&self, url: &Url) -> Result<reqwest::blocking::Response, ExtenderError> {
        debug!(target: SOURCE_TARGET, %url, "requesting");
        let download_error = |message: String| ExtenderError::Download {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|error| download_error(error.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }
        Ok(response)
    }
}

impl BundleSource for HttpBundleSource {
    fn info(&self, id: &ExtenderId) -> Result<ExtenderInfo, ExtenderError> {
        let url = self.info_url(id)?;
        self.get(&url)?
            .json::<ExtenderInfo>()
            .map_err(|error| ExtenderError::Download {
                url: url.to_string(),
                message: error.to_string(),
            })
    }

    fn fetch(&self, info: &ExtenderInfo) -> Result<Vec<u8>, ExtenderError> {
        let bytes = self
            .get(&info.url)?
            .bytes()
            .map_err(|error| ExtenderError::Download {
                url: info.url.to_string(),
                message: error.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}

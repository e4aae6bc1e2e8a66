//! Error types for the ion-tiles crate.

use std::fmt;

/// Result type for ion-tiles operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or fetching hosted tilesets.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// JSON decoding failed.
    Json {
        /// Context for where the error occurred.
        context: &'static str,
        /// The error message.
        message: String,
    },
    /// The asset exists but is not a 3D Tiles tileset.
    UnsupportedAsset {
        /// The asset identifier.
        asset_id: u64,
        /// The asset type reported by the endpoint.
        asset_type: String,
    },
    /// Cache operation failed.
    Cache {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
    /// Invalid data in response.
    InvalidData {
        /// Context for where the error occurred.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
}

impl Error {
    /// Returns true if the server rejected the request's credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::HttpStatus { status: 401, .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Json { context, message } => {
                write!(f, "failed to decode {context}: {message}")
            }
            Error::UnsupportedAsset {
                asset_id,
                asset_type,
            } => {
                write!(f, "asset {asset_id} has unsupported type {asset_type}")
            }
            Error::Cache { operation, message } => {
                write!(f, "cache {operation} failed: {message}")
            }
            Error::InvalidData { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        let unauthorized = Error::HttpStatus {
            url: "https://example.com/tileset.json".to_string(),
            status: 401,
        };
        assert!(unauthorized.is_unauthorized());

        let missing = Error::HttpStatus {
            url: "https://example.com/tileset.json".to_string(),
            status: 404,
        };
        assert!(!missing.is_unauthorized());
    }

    #[test]
    fn test_display_includes_asset_id() {
        let err = Error::UnsupportedAsset {
            asset_id: 2_437_470,
            asset_type: "IMAGERY".to_string(),
        };
        assert_eq!(err.to_string(), "asset 2437470 has unsupported type IMAGERY");
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad command line or option combination; the message is printed
    /// verbatim to stderr, jcommander-style.
    #[error("{0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    LibXml2(#[from] LibXml2Error),

    #[error("Could not parse document: {document}: {details}")]
    Parse { document: String, details: String },

    #[error("Could not load schema: {uri}: {details}")]
    SchemaLoad { uri: String, details: String },

    #[error("Transformation failed: {details}")]
    Transform { details: String },
}

/// Catalog loading and lookup error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unsupported catalog location (only file URIs can be loaded): {uri}")]
    UnsupportedScheme { uri: String },

    #[error("Could not read catalog {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog {uri} is not well-formed: {details}")]
    Malformed { uri: String, details: String },

    #[error("{uri} is not an OASIS XML catalog")]
    NotACatalog { uri: String },

    #[error("Invalid entry in catalog {uri}: {details}")]
    InvalidEntry { uri: String, details: String },

    #[error("Cannot interpret {locator} as a file path or URI")]
    InvalidLocator { locator: String },
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// LibXML2/libxslt-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Could not read {}: {details}", file.display())]
    ReadFailed { file: PathBuf, details: String },

    #[error("Could not load schema: {uri}")]
    SchemaParseFailed { uri: String },

    #[error("Could not load grammar: {uri}")]
    GrammarParseFailed { uri: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("libxml2 internal error (code {code})")]
    InternalError { code: i32 },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Could not compile stylesheet: {uri}")]
    StylesheetParseFailed { uri: String },

    #[error("Transformation produced no result")]
    TransformFailed,

    #[error("Could not serialize transformation result")]
    OutputFailed,

    #[error("Path contains characters libxml2 cannot accept: {}", path.display())]
    InvalidPath { path: PathBuf },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_display_is_verbatim() {
        let err = AppError::Usage("The resolver must be enabled for the lookup command".into());
        assert_eq!(
            err.to_string(),
            "The resolver must be enabled for the lookup command"
        );
    }

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::NotACatalog {
            uri: "file:///tmp/not-a-catalog.xml".into(),
        };
        assert!(err.to_string().contains("not an OASIS XML catalog"));

        let err = CatalogError::InvalidEntry {
            uri: "file:///tmp/catalog.xml".into(),
            details: "public entry missing publicId".into(),
        };
        assert!(err.to_string().contains("Invalid entry"));
        assert!(err.to_string().contains("missing publicId"));
    }

    #[test]
    fn test_catalog_error_is_transparent_in_app_error() {
        let err: AppError = CatalogError::UnsupportedScheme {
            uri: "ftp://example.com/catalog.xml".into(),
        }
        .into();
        assert!(err.to_string().starts_with("Unsupported catalog location"));
    }

    #[test]
    fn test_libxml2_error_conversion() {
        let err: AppError = LibXml2Error::SchemaParseFailed {
            uri: "file:///tmp/schema.xsd".into(),
        }
        .into();
        match err {
            AppError::LibXml2(LibXml2Error::SchemaParseFailed { .. }) => (),
            other => panic!("Expected LibXml2 error, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing catalog");
        let err = CatalogError::Io {
            uri: "file:///tmp/catalog.xml".into(),
            source: io,
        };
        assert!(err.source().is_some());
        assert_eq!(err.source().unwrap().to_string(), "missing catalog");
    }
}

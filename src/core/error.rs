//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, AppError>;

/// Top-level application error taxonomy.
///
/// Failures are contained at the domain or module boundary: one failing
/// domain never aborts a batch and one failing enrichment module never
/// blocks the remaining modules. Only configuration errors are fatal, and
/// only for the unit they configure.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not extract domain: {0}")]
    DomainExtraction(String),

    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Domain does not exist (NXDOMAIN): {0}")]
    NxDomain(String),

    #[error("No usable DNS records for {0}")]
    NoDnsRecords(String),

    #[error("DNS resolution failed: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("SMTP TLS error: {0}")]
    SmtpTls(String),

    #[error("SMTP check inconclusive: {0}")]
    SmtpInconclusive(String),

    #[error("WebDriver session error: {0}")]
    WebDriverSession(String),

    #[error("WebDriver command error: {0}")]
    WebDriverCmd(#[from] fantoccini::error::CmdError),

    #[error("Verification blocked by remote service: {0}")]
    VerificationBlocked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hard timeout exceeded: {0}")]
    HardTimeout(String),
}

impl From<fantoccini::error::NewSessionError> for AppError {
    fn from(e: fantoccini::error::NewSessionError) -> Self {
        AppError::WebDriverSession(e.to_string())
    }
}

/// Per-card extraction failure.
///
/// A card that fails to parse is logged and counted at the call site; it
/// never aborts the surrounding page, and a failing page never aborts the
/// surrounding domain.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("card has no usable name text")]
    MissingName,

    #[error("rejected candidate name '{0}'")]
    RejectedName(String),
}

//! Result type for a single SMTP verification attempt.

/// Outcome of one RCPT-probe conversation.
///
/// `exists` is three-valued: `Some(true)` / `Some(false)` are conclusive
/// verdicts, `None` is indeterminate. Indeterminate results may or may
/// not be worth retrying depending on what the server said.
#[derive(Debug, Clone)]
pub struct SmtpVerificationResult {
    pub exists: Option<bool>,
    pub message: String,
    pub is_catch_all: bool,
    pub should_retry: bool,
}

impl SmtpVerificationResult {
    /// A conclusive verdict (deliverable or undeliverable).
    pub fn conclusive(exists: bool, message: impl Into<String>, is_catch_all: bool) -> Self {
        SmtpVerificationResult {
            exists: Some(exists),
            message: message.into(),
            is_catch_all,
            should_retry: false,
        }
    }

    /// Indeterminate, retriable (greylisting, transient 4xx, TLS retry).
    pub fn inconclusive_retry(message: impl Into<String>) -> Self {
        SmtpVerificationResult {
            exists: None,
            message: message.into(),
            is_catch_all: false,
            should_retry: true,
        }
    }

    /// Indeterminate and not worth retrying this run (port blocked,
    /// sender rejected, unresolvable exchanger).
    pub fn inconclusive_no_retry(message: impl Into<String>) -> Self {
        SmtpVerificationResult {
            exists: None,
            message: message.into(),
            is_catch_all: false,
            should_retry: false,
        }
    }

    /// Accepted, but so is any random local part: the domain is
    /// catch-all, so acceptance proves nothing about this address.
    pub fn catch_all(message: impl Into<String>) -> Self {
        SmtpVerificationResult {
            exists: None,
            message: message.into(),
            is_catch_all: true,
            should_retry: false,
        }
    }
}

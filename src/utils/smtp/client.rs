//! Provides the SmtpVerifier client for diagnosing email deliverability via SMTP.
//!
//! Strictly RCPT-probing: the conversation stops after RCPT TO and no
//! message is ever submitted. Connections to the same mail exchanger are
//! spaced out through a [`HostGate`] so repeated probes do not trip
//! greylisting or abuse defenses.

use super::error::handle_smtp_error;
use super::result::SmtpVerificationResult;
use crate::core::config::{get_random_sleep_duration, Config};
use crate::core::error::{AppError, Result};
use crate::utils::rate_limit::{Fuse, HostGate};

use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::commands::{Ehlo, Mail, Rcpt};
use lettre::transport::smtp::response::{Code, Severity};
use lettre::Address;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Connection parameters for SMTP verification
struct ConnectionParams {
    socket_addr: std::net::SocketAddr,
    helo_name: lettre::transport::smtp::extension::ClientId,
    timeout: Duration,
    use_tls: bool,
}

/// Length of the random local part used to probe for catch-all behavior.
const CATCH_ALL_PROBE_LEN: usize = 14;

/// Represents a client for verifying email addresses via SMTP.
#[derive(Clone)]
pub struct SmtpVerifier {
    config: Arc<Config>,
    gate: HostGate,
    fuse: Fuse,
}

impl SmtpVerifier {
    /// Creates a new SmtpVerifier with the given configuration.
    ///
    /// The fuse is shared: once any probe discovers that outbound port 25
    /// is blocked on this network, every later probe short-circuits to
    /// indeterminate for the rest of the run.
    pub fn new(config: Arc<Config>, fuse: Fuse) -> Self {
        let gate = HostGate::new(config.smtp_host_gap);
        Self { config, gate, fuse }
    }

    pub fn fuse(&self) -> &Fuse {
        &self.fuse
    }

    /// Verifies an email using SMTP with retries for inconclusive results.
    ///
    /// # Returns
    /// The final [`SmtpVerificationResult`] after up to
    /// `max_verification_attempts` conversations.
    pub async fn verify_with_retries(
        &self,
        email: &str,
        domain: &str,
        mail_server: &str,
    ) -> SmtpVerificationResult {
        let mut last = SmtpVerificationResult::inconclusive_no_retry(
            "SMTP check did not run or complete".to_string(),
        );

        for attempt in 0..self.config.max_verification_attempts {
            if self.fuse.is_tripped() {
                return SmtpVerificationResult::inconclusive_no_retry(format!(
                    "SMTP disabled for this run: {}",
                    self.fuse.reason().unwrap_or_default()
                ));
            }

            tracing::debug!(target: "smtp_task",
                "Attempt {}/{} to verify <{}> via SMTP server {}",
                attempt + 1,
                self.config.max_verification_attempts,
                email,
                mail_server
            );

            match self.verify_email(email, domain, mail_server).await {
                Ok(result) => {
                    let conclusive = result.exists.is_some();
                    let catch_all = result.is_catch_all;
                    let retriable = result.should_retry;
                    last = result;

                    if conclusive {
                        tracing::debug!(target: "smtp_task",
                            "SMTP check for <{}> conclusive (Result: {:?}, Catch-all: {}) on attempt {}.",
                            email, last.exists, catch_all, attempt + 1
                        );
                        break;
                    }
                    if catch_all {
                        tracing::info!(target: "smtp_task",
                            "SMTP check for <{}> determined domain is a catch-all on attempt {}. No need to retry.",
                            email, attempt + 1
                        );
                        break;
                    }
                    if !retriable {
                        tracing::warn!(target: "smtp_task",
                            "SMTP check for <{}> failed with non-retriable status on attempt {}. Stopping. Msg: {}",
                            email, attempt + 1, last.message
                        );
                        break;
                    }

                    tracing::warn!(target: "smtp_task",
                        "SMTP check for <{}> inconclusive on attempt {}. Message: {}. Will retry if attempts remain.",
                        email, attempt + 1, last.message
                    );
                }
                Err(e) => {
                    tracing::error!(target: "smtp_task",
                        "Internal error during SMTP verification attempt {} for <{}>: {}", attempt + 1, email, e
                    );
                    last = SmtpVerificationResult::inconclusive_no_retry(format!(
                        "Internal error during SMTP check: {}",
                        e
                    ));
                    break;
                }
            }

            if attempt < self.config.max_verification_attempts - 1 {
                let sleep_duration = get_random_sleep_duration(&self.config);
                tracing::debug!(target: "smtp_task",
                    "Sleeping {:?} before next SMTP attempt for <{}>.", sleep_duration, email);
                tokio::time::sleep(sleep_duration).await;
            }
        }

        tracing::info!(target: "smtp_task",
            "Final SMTP verification result for <{}> via {}: Status={:?}, Catch-all={}, Msg='{}'",
            email, mail_server, last.exists, last.is_catch_all, last.message
        );

        last
    }

    /// Performs the SMTP RCPT TO check for a single email address.
    pub async fn verify_email(
        &self,
        email: &str,
        domain: &str,
        mail_server: &str,
    ) -> Result<SmtpVerificationResult> {
        tracing::debug!(target: "smtp_task",
            "Starting SMTP check for {} via {} (Domain: {})",
            email,
            mail_server,
            domain
        );

        let recipient_address = match Address::from_str(email) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(target: "smtp_task", "Invalid recipient email format '{}': {}", email, e);
                return Ok(SmtpVerificationResult::conclusive(
                    false,
                    format!("Invalid email format: {}", e),
                    false,
                ));
            }
        };

        let sender_address = Address::from_str(&self.config.smtp_sender_email)
            .map_err(|e| AppError::Config(format!("Invalid sender email in config: {}", e)))?;

        let socket_addr = match (mail_server, 25_u16).to_socket_addrs()?.next() {
            Some(addr) => addr,
            None => {
                tracing::error!(target: "smtp_task", "Could not resolve mail server address: {}", mail_server);
                return Ok(SmtpVerificationResult::inconclusive_no_retry(format!(
                    "Could not resolve mail server address: {}",
                    mail_server
                )));
            }
        };

        // Same-exchanger spacing happens here, not in the callers.
        self.gate.acquire(mail_server).await;

        let helo_name =
            lettre::transport::smtp::extension::ClientId::Domain("localhost".to_string());

        let params = ConnectionParams {
            socket_addr,
            helo_name,
            timeout: self.config.smtp_timeout,
            use_tls: false,
        };

        let connect_result = self
            .try_connection(
                &params,
                &sender_address,
                &recipient_address,
                email,
                domain,
                mail_server,
            )
            .await;

        if let Ok(result) = &connect_result {
            let msg = result.message.to_lowercase();
            if msg.contains("starttls")
                || msg.contains("tls required")
                || (msg.contains("530")
                    && msg.contains("5.7.0")
                    && !msg.contains("authentication required"))
            {
                tracing::info!(target: "smtp_task",
                    "Server {} appears to require STARTTLS, retrying connection with TLS enabled", mail_server);

                self.gate.acquire(mail_server).await;
                let tls_params = ConnectionParams {
                    socket_addr: params.socket_addr,
                    helo_name: params.helo_name,
                    timeout: params.timeout,
                    use_tls: true,
                };

                return self
                    .try_connection(
                        &tls_params,
                        &sender_address,
                        &recipient_address,
                        email,
                        domain,
                        mail_server,
                    )
                    .await;
            }
        }

        connect_result
    }

    /// Probes whether a domain's exchanger accepts mail for a random
    /// local part that cannot exist. `Some(true)` marks the domain as
    /// catch-all; `None` means the probe could not decide.
    pub async fn probe_catch_all(&self, domain: &str, mail_server: &str) -> Option<bool> {
        if self.fuse.is_tripped() {
            return None;
        }

        let random_local = random_probe_local();
        let probe = format!("{}@{}", random_local, domain);

        match self.verify_email(&probe, domain, mail_server).await {
            Ok(result) => match result.exists {
                // The random address was accepted, so everything is.
                Some(true) => Some(true),
                Some(false) => Some(false),
                None if result.is_catch_all => Some(true),
                None => None,
            },
            Err(e) => {
                tracing::debug!(target: "smtp_task", "Catch-all probe failed for {}: {}", domain, e);
                None
            }
        }
    }

    async fn try_connection(
        &self,
        params: &ConnectionParams,
        sender_address: &Address,
        recipient_address: &Address,
        email: &str,
        domain: &str,
        mail_server: &str,
    ) -> Result<SmtpVerificationResult> {
        tracing::debug!(target: "smtp_task",
            "Attempting SMTP connection to {} at {} (TLS: {})",
            mail_server, params.socket_addr, params.use_tls
        );

        let tls_parameters = if params.use_tls {
            Some(
                lettre::transport::smtp::client::TlsParameters::new(mail_server.to_string())
                    .map_err(|e| {
                        AppError::SmtpTls(format!(
                            "Failed to create TLS parameters for {}: {}",
                            mail_server, e
                        ))
                    })?,
            )
        } else {
            None
        };

        let mut smtp_conn = match SmtpConnection::connect(
            params.socket_addr,
            Some(params.timeout),
            &params.helo_name,
            tls_parameters.as_ref(),
            None,
        ) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(target: "smtp_task",
                    "SMTP connection failed for {} (TLS={}): {}",
                    mail_server, params.use_tls, e);

                let err_string = e.to_string();
                if err_string.contains("timed out")
                    || err_string.contains("connection refused")
                    || err_string.contains("Network is unreachable")
                {
                    tracing::error!(target: "smtp_task",
                        "Connection to {} on port 25 failed. The port is likely blocked by an ISP, firewall, or network configuration.",
                        mail_server);
                    return Ok(SmtpVerificationResult::inconclusive_no_retry(format!(
                        "Connection failed ({}): Port 25 access might be blocked.",
                        err_string
                    )));
                }

                return Ok(handle_smtp_error(&e, mail_server));
            }
        };

        tracing::debug!(target: "smtp_task",
            "Established {} connection to {}:{}",
            if params.use_tls { "TLS" } else { "plaintext" },
            mail_server,
            params.socket_addr.port());

        match smtp_conn.command(Ehlo::new(params.helo_name.clone())) {
            Ok(response) => {
                if response.is_positive() {
                    tracing::debug!(target: "smtp_task", "EHLO successful for {}: Code={}", mail_server, response.code());
                } else {
                    tracing::warn!(target: "smtp_task", "EHLO command rejected by {}: {} {}", mail_server, response.code(), response.message().collect::<Vec<&str>>().join(" "));
                }
            }
            Err(e) => {
                tracing::warn!(target: "smtp_task", "Error sending EHLO command to {}: {}", mail_server, e);
                return Ok(handle_smtp_error(&e, mail_server));
            }
        }

        tracing::debug!(target: "smtp_task", "Sending MAIL FROM:<{}> to {}...", &self.config.smtp_sender_email, mail_server);
        match smtp_conn.command(Mail::new(Some(sender_address.clone()), vec![])) {
            Ok(response) => {
                if !response.is_positive() {
                    let message = response.message().collect::<Vec<&str>>().join(" ");
                    tracing::error!(target: "smtp_task",
                        "SMTP sender '{}' rejected by {}: {} {:?}",
                        &self.config.smtp_sender_email, mail_server, response.code(), message
                    );

                    if !params.use_tls
                        && (message.to_lowercase().contains("starttls")
                            || (response.code().to_string().starts_with("530")
                                && message.contains("5.7.0")))
                    {
                        smtp_conn.quit().ok();
                        return Ok(SmtpVerificationResult::inconclusive_retry(format!(
                            "Server requires STARTTLS: {} {}",
                            response.code(),
                            message
                        )));
                    }

                    smtp_conn.quit().ok();
                    return Ok(SmtpVerificationResult::inconclusive_no_retry(format!(
                        "MAIL FROM rejected: {} {}",
                        response.code(),
                        message
                    )));
                }
            }
            Err(e) => {
                tracing::error!(target: "smtp_task", "Error during MAIL FROM on {}: {}", mail_server, e);
                smtp_conn.quit().ok();
                return Ok(handle_smtp_error(&e, mail_server));
            }
        }

        tracing::debug!(target: "smtp_task", "Sending RCPT TO:<{}> to {}...", email, mail_server);
        let rcpt_result = smtp_conn.command(Rcpt::new(recipient_address.clone(), vec![]));

        let (target_code, target_message): (Code, String) = match rcpt_result {
            Ok(response) => {
                tracing::info!(target: "smtp_task",
                    "RCPT TO:<{}> initial response from {}: Code={}, Msg='{}'",
                    email, mail_server, response.code(), response.message().collect::<Vec<&str>>().join(" ")
                );
                (
                    response.code(),
                    response.message().collect::<Vec<&str>>().join(" "),
                )
            }
            Err(e) => {
                let err_string = e.to_string();
                let is_nonexistent_error = err_string.contains("550")
                    && (err_string.contains("does not exist")
                        || err_string.contains("no such user")
                        || err_string.contains("user unknown")
                        || err_string.contains("recipient not found")
                        || err_string.contains("invalid mailbox")
                        || err_string.contains("mailbox unavailable")
                        || err_string.contains("NoSuchUser"));

                smtp_conn.quit().ok();
                if is_nonexistent_error {
                    tracing::info!(target: "smtp_task",
                        "RCPT TO rejected for <{}> by {}. Email likely does not exist. Error: {}",
                        email, mail_server, e);
                    return Ok(SmtpVerificationResult::conclusive(
                        false,
                        format!("SMTP Rejected (User Likely Unknown): {}", err_string),
                        false,
                    ));
                } else {
                    tracing::error!(target: "smtp_task",
                        "Error during RCPT TO for <{}> on {}: {}",
                        email, mail_server, e);
                    return Ok(handle_smtp_error(&e, mail_server));
                }
            }
        };

        let mut is_catch_all = false;
        if target_code.severity == Severity::PositiveCompletion {
            is_catch_all = self
                .rcpt_random_probe(domain, mail_server, &mut smtp_conn)
                .await;
        }

        let final_result = self.evaluate_smtp_response(target_code, target_message, is_catch_all);

        smtp_conn
            .quit()
            .map_err(|e| {
                tracing::warn!(target: "smtp_task", "Error during SMTP QUIT command on {}: {}", mail_server, e);
                AppError::Smtp(e)
            })
            .ok();

        Ok(final_result)
    }

    /// Performs a catch-all check by testing a random non-existent address
    /// on the already-open connection.
    async fn rcpt_random_probe(
        &self,
        domain: &str,
        mail_server: &str,
        smtp_conn: &mut SmtpConnection,
    ) -> bool {
        let random_user = format!("{}@{}", random_probe_local(), domain);

        match Address::from_str(&random_user) {
            Ok(random_address) => {
                tracing::debug!(target: "smtp_task", "Performing catch-all check with: RCPT TO:<{}> on {}", random_user, mail_server);
                match smtp_conn.command(Rcpt::new(random_address, vec![])) {
                    Ok(response) if response.code().severity == Severity::PositiveCompletion => {
                        // If the random local part is ALSO accepted, the domain is a catch-all
                        tracing::warn!(target: "smtp_task",
                            "Domain {} (MX: {}) appears to be a catch-all (accepted random user {} with code {})",
                            domain, mail_server, random_user, response.code()
                        );
                        true
                    }
                    Ok(response) => {
                        tracing::debug!(target: "smtp_task",
                            "Catch-all check negative for {} (MX: {}). Random user rejected with code {}.",
                            domain, mail_server, response.code()
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!(target: "smtp_task", "Error during catch-all RCPT TO check for {} on {} (ignoring catch-all result): {}", random_user, mail_server, e);
                        false
                    }
                }
            }
            Err(_) => {
                tracing::error!(target: "smtp_task", "Failed to parse generated random email for catch-all check: {}", random_user);
                false
            }
        }
    }

    /// Evaluates SMTP response codes and messages to determine email existence
    fn evaluate_smtp_response(
        &self,
        target_code: Code,
        target_message: String,
        is_catch_all: bool,
    ) -> SmtpVerificationResult {
        match target_code.severity {
            Severity::PositiveCompletion => {
                if is_catch_all {
                    SmtpVerificationResult::catch_all(format!(
                        "SMTP Accepted (Domain is Catch-All): {} {}",
                        target_code, target_message
                    ))
                } else {
                    SmtpVerificationResult::conclusive(
                        true,
                        format!("SMTP Verification OK: {} {}", target_code, target_message),
                        false,
                    )
                }
            }
            Severity::PositiveIntermediate => {
                // 2xx code, but not final positive completion (rare for RCPT TO)
                SmtpVerificationResult::inconclusive_retry(format!(
                    "SMTP Unexpected Intermediate Code: {} {}",
                    target_code, target_message
                ))
            }
            Severity::TransientNegativeCompletion => {
                // 4xx code - Temporary failure, greylisting, etc.
                SmtpVerificationResult::inconclusive_retry(format!(
                    "SMTP Temp Failure/Greylisted? (4xx): {} {}",
                    target_code, target_message
                ))
            }
            Severity::PermanentNegativeCompletion => {
                // 5xx code - Permanent failure
                let rejection_phrases = [
                    "unknown",
                    "no such",
                    "unavailable",
                    "rejected",
                    "doesn't exist",
                    "disabled",
                    "invalid address",
                    "recipient not found",
                    "user unknown",
                    "mailbox unavailable",
                    "no mailbox",
                    "address rejected",
                    "invalid recipient",
                    "policy violation",
                ];
                let message_lower = target_message.to_lowercase();
                let code_str = target_code.to_string();

                if ["550", "551", "553"].contains(&code_str.as_str())
                    || rejection_phrases.iter().any(|p| message_lower.contains(p))
                {
                    SmtpVerificationResult::conclusive(
                        false,
                        format!(
                            "SMTP Rejected (User Likely Unknown): {} {}",
                            target_code, target_message
                        ),
                        false,
                    )
                } else {
                    SmtpVerificationResult::conclusive(
                        false,
                        format!(
                            "SMTP Rejected (Policy/Other 5xx): {} {}",
                            target_code, target_message
                        ),
                        false,
                    )
                }
            }
        }
    }
}

/// Random alphanumeric local part for catch-all probing.
fn random_probe_local() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CATCH_ALL_PROBE_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect()
}

/// Tests basic SMTP connectivity to a known reliable server (Google).
/// This helps diagnose if outbound port 25 is generally blocked.
pub async fn test_smtp_connectivity() -> Result<()> {
    tracing::info!("Testing outbound SMTP (port 25) connectivity to Google...");

    let test_server = "gmail-smtp-in.l.google.com";
    let test_port = 25u16;

    let socket_addr = match (test_server, test_port)
        .to_socket_addrs()
        .map_err(|e| AppError::Config(format!("DNS resolution failed for {}: {}", test_server, e)))?
        .next()
    {
        Some(addr) => addr,
        None => {
            return Err(AppError::Config(format!(
                "Could not resolve any IP address for {}",
                test_server
            )));
        }
    };

    tracing::debug!("Attempting connection to {} ({})", test_server, socket_addr);

    let helo_name = lettre::transport::smtp::extension::ClientId::Domain("localhost".to_string());
    let timeout = Duration::from_secs(5);

    match tokio::time::timeout(timeout, async {
        SmtpConnection::connect(socket_addr, Some(timeout), &helo_name, None, None)
    })
    .await
    {
        Ok(Ok(mut conn)) => {
            tracing::info!(
                "SMTP connectivity test successful (connected to {}).",
                test_server
            );
            conn.quit().ok();
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(
                "SMTP connectivity test failed: Error connecting to {}: {}",
                test_server,
                e
            );
            let err_str = e.to_string().to_lowercase();
            if err_str.contains("connection refused") || err_str.contains("network is unreachable")
            {
                Err(AppError::SmtpInconclusive(format!(
                    "Connection to {} refused or network unreachable. Check firewall or network settings.", test_server
                )))
            } else {
                Err(AppError::Smtp(e))
            }
        }
        Err(_) => {
            tracing::error!(
                "SMTP connectivity test timed out connecting to {}. Outbound port 25 is likely blocked by ISP, firewall, or network provider.", test_server);
            Err(AppError::SmtpInconclusive(
                "SMTP connection timed out - port 25 is likely blocked.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_local_is_fourteen_lowercase_alphanumerics() {
        for _ in 0..32 {
            let local = random_probe_local();
            assert_eq!(local.len(), CATCH_ALL_PROBE_LEN);
            assert!(local.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}

//! DNS resolver construction and record lookups.
//!
//! MX resolution feeds the SMTP verifier; TXT/SOA lookups feed the DNS
//! harvesting stage. Lookup timeouts are reported as errors and treated
//! as "unknown" upstream, never as proof a record is absent.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use std::net::{IpAddr, SocketAddr};
use trust_dns_resolver::config::{
    NameServerConfig, Protocol, ResolverConfig, ResolverOpts,
};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

/// The preferred mail exchanger for a domain.
#[derive(Debug, Clone)]
pub struct MailServer {
    pub exchange: String,
    pub preference: u16,
}

/// Builds the shared Tokio resolver from the configured name servers.
pub async fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let mut resolver_config = ResolverConfig::new();
    for server in &config.dns_servers {
        match server.parse::<IpAddr>() {
            Ok(ip) => {
                resolver_config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid DNS server address '{}': {}", server, e);
            }
        }
    }

    if resolver_config.name_servers().is_empty() {
        tracing::info!("No usable DNS servers configured; falling back to Google public DNS.");
        resolver_config = ResolverConfig::google();
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;
    opts.attempts = 2;

    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

/// Resolves the lowest-preference MX record for a domain.
///
/// Falls back to the domain's own A record when no MX exists (RFC 5321
/// implicit MX). NXDOMAIN and empty answers map to dedicated error
/// variants so callers can distinguish "no mail domain" from transient
/// resolver trouble.
pub async fn resolve_mail_server(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Result<MailServer> {
    match resolver.mx_lookup(domain).await {
        Ok(lookup) => {
            let mut records: Vec<(u16, String)> = lookup
                .iter()
                .map(|mx| {
                    (
                        mx.preference(),
                        mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                    )
                })
                .filter(|(_, exchange)| !exchange.is_empty() && exchange != ".")
                .collect();

            if records.is_empty() {
                tracing::debug!("MX lookup for {} returned only null records.", domain);
                return fallback_to_a_record(resolver, domain).await;
            }

            records.sort_by_key(|(preference, _)| *preference);
            let (preference, exchange) = records.remove(0);
            Ok(MailServer {
                exchange,
                preference,
            })
        }
        Err(e) => {
            if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                tracing::debug!("No MX records for {}; trying A record fallback.", domain);
                fallback_to_a_record(resolver, domain).await
            } else if e.to_string().contains("NXDOMAIN") {
                Err(AppError::NxDomain(domain.to_string()))
            } else {
                Err(AppError::Dns(e))
            }
        }
    }
}

async fn fallback_to_a_record(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Result<MailServer> {
    match resolver.lookup_ip(domain).await {
        Ok(lookup) => {
            if lookup.iter().next().is_some() {
                // Implicit MX: the host itself accepts mail on port 25.
                Ok(MailServer {
                    exchange: domain.to_string(),
                    preference: 0,
                })
            } else {
                Err(AppError::NoDnsRecords(domain.to_string()))
            }
        }
        Err(e) => {
            if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                Err(AppError::NoDnsRecords(domain.to_string()))
            } else if e.to_string().contains("NXDOMAIN") {
                Err(AppError::NxDomain(domain.to_string()))
            } else {
                Err(AppError::Dns(e))
            }
        }
    }
}

/// Collects the text of every TXT record for a name. Missing records are
/// an empty result, not an error.
pub async fn txt_record_text(resolver: &TokioAsyncResolver, name: &str) -> String {
    match resolver.txt_lookup(name).await {
        Ok(lookup) => lookup
            .iter()
            .map(|txt| {
                txt.iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .collect::<Vec<_>>()
            .join(" "),
        Err(e) => {
            tracing::trace!("TXT lookup for {} yielded nothing: {}", name, e);
            String::new()
        }
    }
}

/// Extracts the administrative contact from a domain's SOA record.
///
/// The SOA rname encodes an address by replacing the `@` with the first
/// dot: `admin.example.com.` means `admin@example.com`.
pub async fn soa_rname_email(resolver: &TokioAsyncResolver, domain: &str) -> Option<String> {
    let lookup = resolver
        .lookup(domain, RecordType::SOA)
        .await
        .ok()?;
    for record in lookup.record_iter() {
        if let Some(RData::SOA(soa)) = record.data() {
            let rname = soa.rname().to_utf8();
            let rname = rname.trim_end_matches('.');
            if let Some((local, host)) = rname.split_once('.') {
                if !local.is_empty() && host.contains('.') {
                    return Some(format!("{}@{}", local, host).to_lowercase());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // The SOA rname decode is pure string handling; exercise it through a
    // small copy of the transformation rather than a live lookup.
    fn decode_rname(rname: &str) -> Option<String> {
        let rname = rname.trim_end_matches('.');
        let (local, host) = rname.split_once('.')?;
        if !local.is_empty() && host.contains('.') {
            Some(format!("{}@{}", local, host).to_lowercase())
        } else {
            None
        }
    }

    #[test]
    fn soa_rname_decodes_to_email() {
        assert_eq!(
            decode_rname("hostmaster.acme.vc."),
            Some("hostmaster@acme.vc".to_string())
        );
        assert_eq!(
            decode_rname("Admin.mail.Example.COM."),
            Some("admin@mail.example.com".to_string())
        );
        assert_eq!(decode_rname("nodots."), None);
    }
}

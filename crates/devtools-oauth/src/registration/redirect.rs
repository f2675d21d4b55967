use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use super::RegistrationError;

/// Validate a client redirect URI
///
/// Must be absolute, `https` (or `http` on a loopback host), and free of a
/// fragment (RFC 6749 §3.1.2).
///
/// # Errors
///
/// Returns [`RegistrationError::InvalidRedirectUri`] naming the broken rule.
pub fn validate_redirect_uri(uri: &str) -> Result<(), RegistrationError> {
    let invalid = |reason: String| RegistrationError::InvalidRedirectUri {
        uri: uri.to_string(),
        reason,
    };

    let url = Url::parse(uri).map_err(|e| invalid(format!("invalid URL: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if !url.host().is_some_and(|host| is_loopback(&host)) {
                return Err(invalid("HTTP redirect URIs must use localhost".to_string()));
            }
        }
        scheme => return Err(invalid(format!("unsupported scheme: {scheme}"))),
    }

    if url.host().is_none() {
        return Err(invalid("redirect URI must have a host".to_string()));
    }

    if url.fragment().is_some() {
        return Err(invalid("redirect URI must not contain fragment".to_string()));
    }

    Ok(())
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => *ip == Ipv4Addr::LOCALHOST,
        Host::Ipv6(ip) => *ip == Ipv6Addr::LOCALHOST,
    }
}

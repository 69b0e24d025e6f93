//! Sanity checks for monitor targets before they are stored.
//!
//! Agents accept either a full http(s) URL or a bare host name.

use anyhow::{Result, anyhow};
use url::Url;

/// Validate a monitor target (url plus optional port)
pub fn validate_target(target: &str, port: Option<u16>) -> Result<()> {
    let target = target.trim();
    if target.is_empty() {
        return Err(anyhow!("Target cannot be empty"));
    }
    if target.chars().any(char::is_whitespace) {
        return Err(anyhow!("Target must not contain whitespace"));
    }

    if target.contains("://") {
        validate_url_target(target)?;
    } else {
        validate_host(target)?;
    }

    if port == Some(0) {
        return Err(anyhow!("Port must be between 1 and 65535"));
    }

    Ok(())
}

fn validate_url_target(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("Invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme '{}'. Must be http or https", other)),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host"));
    }

    Ok(())
}

fn validate_host(host: &str) -> Result<()> {
    if host.len() > 253 {
        return Err(anyhow!("Host name too long"));
    }

    let valid = host
        .split('.')
        .all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });

    if valid { Ok(()) } else { Err(anyhow!("Invalid host name: {}", host)) }
}

//! Status placeholders written into the full-text column.
//!
//! Format: `[file_<status>] YYYY-MM-DD HH:MM:SS | IP:<worker ip>`, local time.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use chrono::{DateTime, Local, TimeZone};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPlaceholder {
    /// Row claimed, work in progress.
    Processing,
    /// Extraction produced no text or failed.
    ExtractEmpty,
    /// The file could not be fetched.
    NotFound,
}

impl StatusPlaceholder {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Processing => "[file_processing]",
            Self::ExtractEmpty => "[file_extract_empty]",
            Self::NotFound => "[file_not_found]",
        }
    }

    pub fn render<Tz: TimeZone>(&self, at: &DateTime<Tz>, ip: &str) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!("{} {} | IP:{}", self.tag(), at.format(TIMESTAMP_FORMAT), ip)
    }
}

/// The worker's address as it appears in placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    ip: String,
}

impl WorkerIdentity {
    /// Use the configured address, or resolve this host's name.
    pub fn resolve(configured: Option<&str>) -> Self {
        match configured.map(str::trim).filter(|ip| !ip.is_empty()) {
            Some(ip) => Self::with_ip(ip),
            None => Self::detect(),
        }
    }

    /// Resolve the local hostname to its first IPv4 address, falling back to loopback.
    pub fn detect() -> Self {
        let ip = resolve_host_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Self { ip: ip.to_string() }
    }

    pub fn with_ip(ip: &str) -> Self {
        Self { ip: ip.to_string() }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Placeholder stamped with the current local time.
    pub fn placeholder(&self, status: StatusPlaceholder) -> String {
        status.render(&Local::now(), &self.ip)
    }
}

fn resolve_host_ip() -> Option<IpAddr> {
    let host = hostname::get().ok()?.into_string().ok()?;
    let addrs = match (host.as_str(), 0).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!("Could not resolve hostname {}: {}", host, e);
            return None;
        }
    };
    addrs.map(|a| a.ip()).find(IpAddr::is_ipv4)
}

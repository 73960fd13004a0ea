//! Tunnel publisher families: command line, URL pattern and failure phrasing.

use crate::common::config::Transport;

/// Program families that publish a local port under a public https URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelProvider {
    /// `lt` from the localtunnel npm package. Supports requested subdomains.
    Localtunnel { program: String },
    /// cloudflared quick tunnels. Names are always assigned by Cloudflare.
    Cloudflare { program: String },
}

const LOCALTUNNEL_SUFFIX: &str = ".loca.lt";
const CLOUDFLARE_SUFFIX: &str = ".trycloudflare.com";

// phrases localtunnel and its server use when a subdomain is refused
const NAME_TAKEN_MARKERS: &[&str] = &[
    "not available",
    "already in use",
    "is taken",
    "unavailable",
];

impl TunnelProvider {
    /// Provider for a transport, `None` for the local-only transport.
    pub fn for_transport(transport: Transport, program: Option<&str>) -> Option<Self> {
        match transport {
            Transport::Localtunnel => Some(TunnelProvider::Localtunnel {
                program: program.unwrap_or("lt").to_string(),
            }),
            Transport::Cloudflare => Some(TunnelProvider::Cloudflare {
                program: program.unwrap_or("cloudflared").to_string(),
            }),
            Transport::Local => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TunnelProvider::Localtunnel { .. } => "localtunnel",
            TunnelProvider::Cloudflare { .. } => "cloudflare",
        }
    }

    pub fn program(&self) -> &str {
        match self {
            TunnelProvider::Localtunnel { program } | TunnelProvider::Cloudflare { program } => {
                program
            }
        }
    }

    pub fn supports_names(&self) -> bool {
        matches!(self, TunnelProvider::Localtunnel { .. })
    }

    pub fn args(&self, local_port: u16, name: Option<&str>) -> Vec<String> {
        match self {
            TunnelProvider::Localtunnel { .. } => {
                let mut args = vec!["--port".to_string(), local_port.to_string()];
                if let Some(name) = name {
                    args.push("--subdomain".to_string());
                    args.push(name.to_string());
                }
                args
            }
            TunnelProvider::Cloudflare { .. } => vec![
                "tunnel".to_string(),
                "--url".to_string(),
                format!("http://localhost:{local_port}"),
                "--no-autoupdate".to_string(),
            ],
        }
    }

    fn host_suffix(&self) -> &'static str {
        match self {
            TunnelProvider::Localtunnel { .. } => LOCALTUNNEL_SUFFIX,
            TunnelProvider::Cloudflare { .. } => CLOUDFLARE_SUFFIX,
        }
    }

    /// Extracts the first `https://<label>.<suffix>` URL from an output line.
    pub fn match_url(&self, line: &str) -> Option<String> {
        let suffix = self.host_suffix();
        let mut rest = line;

        while let Some(start) = rest.find("https://") {
            let after = &rest[start + "https://".len()..];
            let host_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
                .unwrap_or(after.len());
            let host = &after[..host_len];

            if let Some(label) = host.strip_suffix(suffix) {
                if !label.is_empty() && !label.starts_with('.') {
                    return Some(format!("https://{host}"));
                }
            }
            rest = after;
        }

        None
    }

    /// Subdomain actually granted, taken from the discovered URL.
    pub fn effective_name(&self, url: &str) -> Option<String> {
        let host = url.strip_prefix("https://")?;
        let label = host.strip_suffix(self.host_suffix())?;
        Some(label.to_string())
    }

    /// Whether the exit transcript reports the requested name as refused.
    pub fn is_name_taken(&self, transcript: &[String]) -> bool {
        if !self.supports_names() {
            return false;
        }
        transcript.iter().any(|line| {
            let line = line.to_lowercase();
            (line.contains("subdomain") || line.contains("name"))
                && NAME_TAKEN_MARKERS.iter().any(|m| line.contains(m))
        })
    }
}

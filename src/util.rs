use std::net::SocketAddr;

pub const DEFAULT_HUB_PORT: u16 = 8080;

const HUB_BIND_ADDR: &str = "FLEET_BIND_ADDR";

/// Bind address override for the hub, if set and parseable.
pub fn get_bind_addr() -> Option<SocketAddr> {
    std::env::var(HUB_BIND_ADDR)
        .ok()
        .and_then(|addr| addr.parse().ok())
}

pub fn get_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| String::from("unknown"))
}

pub fn agent_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

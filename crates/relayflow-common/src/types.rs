//! Common types for RelayFlow

use serde::{Deserialize, Serialize};

/// Unique identifier for tenants (API keys)
pub type TenantId = i64;

/// Unique identifier for plans
pub type PlanId = i64;

/// Unique identifier for SMTP relays
pub type RelayId = i64;

/// Tenant status values stored in the `status` column
pub mod tenant_status {
    pub const ACTIVE: &str = "active";
    pub const DISABLED: &str = "disabled";
}

/// Relay status values stored in the `status` column
pub mod relay_status {
    pub const ACTIVE: &str = "active";
    pub const PAUSED: &str = "paused";
    pub const FAILED: &str = "failed";
}

/// Send log status values
pub mod send_status {
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
}

/// Rate-limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindow {
    Minute,
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl QuotaWindow {
    /// All windows in check order
    pub const ALL: [QuotaWindow; 5] = [
        QuotaWindow::Minute,
        QuotaWindow::Daily,
        QuotaWindow::Weekly,
        QuotaWindow::Monthly,
        QuotaWindow::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaWindow::Minute => "minute",
            QuotaWindow::Daily => "daily",
            QuotaWindow::Weekly => "weekly",
            QuotaWindow::Monthly => "monthly",
            QuotaWindow::Total => "total",
        }
    }

    /// Parse a window name as used by the admin reset endpoint
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(QuotaWindow::Minute),
            "daily" => Some(QuotaWindow::Daily),
            "weekly" => Some(QuotaWindow::Weekly),
            "monthly" => Some(QuotaWindow::Monthly),
            "total" => Some(QuotaWindow::Total),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuotaWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a relay connection is encrypted, resolved from the stored
/// `encryption` string at send time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Implicit TLS on connect (usually port 465)
    Wrapper,
    /// Plaintext connection upgraded via STARTTLS (usually port 587)
    StartTls,
    /// No TLS at all
    None,
}

impl TlsMode {
    /// Resolve the stored encryption value; unknown values fall back to
    /// STARTTLS like the empty default
    pub fn from_encryption(encryption: &str) -> Self {
        match encryption {
            "ssl" => TlsMode::Wrapper,
            "none" => TlsMode::None,
            _ => TlsMode::StartTls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_window_roundtrip() {
        for window in QuotaWindow::ALL {
            assert_eq!(QuotaWindow::parse(window.as_str()), Some(window));
        }
        assert_eq!(QuotaWindow::parse("hourly"), None);
    }

    #[test]
    fn test_tls_mode_resolution() {
        assert_eq!(TlsMode::from_encryption("ssl"), TlsMode::Wrapper);
        assert_eq!(TlsMode::from_encryption("tls"), TlsMode::StartTls);
        assert_eq!(TlsMode::from_encryption("starttls"), TlsMode::StartTls);
        assert_eq!(TlsMode::from_encryption("none"), TlsMode::None);
        assert_eq!(TlsMode::from_encryption(""), TlsMode::StartTls);
        assert_eq!(TlsMode::from_encryption("weird"), TlsMode::StartTls);
    }
}

/// The lifecycle state of a service, as last reported by its init system.
///
/// States are never inferred; each one comes from re-querying the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ServiceStatus {
    /// The service is running.
    Active,
    /// The service is cleanly stopped. Only backends that track "down"
    /// explicitly report this.
    Inactive,
    /// The backend could not supervise the service at all.
    Failed,
    /// The status could not be determined.
    Unknown,
}

impl ServiceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

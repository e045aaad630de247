use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of one exploration run.
///
/// The networked backend scopes every key it writes under this identity and
/// removes exactly that namespace on teardown, so concurrent runs against the
/// same shared server never see or delete each other's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    name: String,
    started_at: u64,
    instance: u32,
}

impl RunId {
    /// A run identity for `name` started now by this process.
    pub fn new(name: impl Into<String>) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::with_parts(name, started_at, std::process::id())
    }

    /// Build a run identity from explicit parts.
    pub fn with_parts(name: impl Into<String>, started_at: u64, instance: u32) -> Self {
        RunId {
            name: name.into(),
            started_at,
            instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start of the run in unix seconds.
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// The namespace key used by scoped backends.
    pub fn namespace(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.started_at, self.instance)
    }
}

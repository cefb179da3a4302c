use k8s_openapi::api::core::v1::Namespace;
use std::fmt;

/// Namespace annotation carrying the debt status marker
pub const DEBT_STATUS_ANNOTATION: &str = "arrears.io/debt-status";

/// Pod annotation recording the scheduler a parked pod had before suspension
pub const PREVIOUS_SCHEDULER_ANNOTATION: &str = "arrears.io/previous-scheduler";

/// Scheduler name reserved for parked pods. No scheduler serves it, so pods
/// carrying it stay pending.
pub const DEFAULT_SCHEDULER_NAME: &str = "arrears-debt-scheduler";

/// Name of the zero-limit ResourceQuota installed in suspended namespaces
pub const DEFAULT_QUOTA_NAME: &str = "debt-limit0";

/// Debt status of a namespace, as written by the billing system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebtStatus {
    /// Account in good standing
    Normal,
    /// Account in arrears, workloads must be suspended
    SuspendRequested,
    /// Debt cleared, workloads must be restored
    ResumeRequested,
    /// Any other marker value; normalized back to `Normal`
    Unrecognized(String),
}

impl DebtStatus {
    /// Parse an annotation value. Never fails: unknown values map to
    /// `Unrecognized`.
    pub fn parse(value: &str) -> Self {
        match value {
            "Normal" => DebtStatus::Normal,
            "Suspend" => DebtStatus::SuspendRequested,
            "Resume" => DebtStatus::ResumeRequested,
            other => DebtStatus::Unrecognized(other.to_string()),
        }
    }

    /// Annotation value for this status
    pub fn as_str(&self) -> &str {
        match self {
            DebtStatus::Normal => "Normal",
            DebtStatus::SuspendRequested => "Suspend",
            DebtStatus::ResumeRequested => "Resume",
            DebtStatus::Unrecognized(raw) => raw,
        }
    }

    /// Read the status marker of a namespace, `None` when it carries none
    pub fn of(namespace: &Namespace) -> Option<Self> {
        namespace
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEBT_STATUS_ANNOTATION))
            .map(|v| Self::parse(v))
    }

    /// Write this status into the namespace's annotations
    pub fn apply_to(&self, namespace: &mut Namespace) {
        namespace
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(DEBT_STATUS_ANNOTATION.to_string(), self.as_str().to_string());
    }
}

impl fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

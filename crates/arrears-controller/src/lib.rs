// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod api_client;
pub mod classify;
pub mod config;
pub mod controller;
pub mod error;
pub mod mock;
pub mod quota;
pub mod recreate;
pub mod traits;
pub mod watcher;

// Re-export primary types
pub use error::{ControllerError, Result};
pub use mock::{ClusterOp, MockCluster, MockOp};
pub use traits::{ClusterApi, WatchStream};

// Re-export pipeline components
pub use classify::{is_parked, Classification, PodClassifier, PodDisposition};
pub use quota::{zero_quota, QuotaGate};
pub use recreate::{parked_replacement, restored_replacement, PodRecreator};

// Re-export controller and watcher types
pub use api_client::ApiClient;
pub use config::ControllerConfig;
pub use controller::{NamespaceController, ReconcileOutcome};
pub use watcher::{DebtStatusWatcher, StatusTracker};

//! Offline/online reconciliation.
//!
//! A [`Reconciler`] runs single-flight passes (pull, push, drain) between
//! the [`LocalStore`](crate::services::LocalStore) and a
//! [`RemoteGateway`](crate::remote::RemoteGateway). The
//! [`ConnectivityMonitor`] decides when passes run and feeds remote change
//! events to the [`ChangeNotifier`].

mod gate;
mod monitor;
mod notifier;
mod reconciler;
mod report;

pub use gate::{PassGuard, SyncGate};
pub use monitor::{spawn_connectivity_probe, ConnectivityMonitor, MonitorHandle};
pub use notifier::ChangeNotifier;
pub use reconciler::{LocalMutation, MutationReceipt, Reconciler, StoreChange};
pub use report::{PassOutcome, SkipReason, SyncFailure, SyncPhase, SyncReport};

// Entry point catalog: typed signatures, dispatch and reconciliation

pub mod reconciler;
pub mod registry;
pub mod signature;

pub use reconciler::{ReconcileReport, SchemaReconciler};
pub use registry::{EntryPointRegistry, InstalledVariant, NamedArgs, bind_query, select_variant};
pub use signature::{ENTRY_POINT_NAME, Signature};

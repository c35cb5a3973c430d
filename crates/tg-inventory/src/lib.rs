//! # tg-inventory
//!
//! Inventory sources and the cancellable compliance scan.
//!
//! An [`InventorySource`] lists resources page by page. [`Scanner::scan`]
//! walks a source, evaluates each resource against a schema, and returns a
//! [`ScanReport`]. A scan that is cancelled or hits a listing error is
//! reported as partial and never presents its metrics as authoritative.
//!
//! Two sources ship with the crate:
//! - [`InMemoryInventory`] for fleets already held in memory (and tests).
//! - [`SnapshotInventory`] for exported JSON/YAML inventory snapshots,
//!   flattening resource groups and standalone resources into one stream.

pub mod cancel;
pub mod error;
pub mod memory;
pub mod scan;
pub mod snapshot;
pub mod source;

pub use cancel::CancellationToken;
pub use error::InventoryError;
pub use memory::{FailureKind, InMemoryInventory, TagUpdate, DEFAULT_PAGE_SIZE};
pub use scan::{PartialReason, ScanCompleteness, ScanOptions, ScanReport, Scanner};
pub use snapshot::{ResourceGroup, SnapshotDocument, SnapshotInventory, RESOURCE_GROUP_TYPE};
pub use source::{InventoryPage, InventorySource};

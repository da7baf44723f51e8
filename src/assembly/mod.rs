//! Entity resolution for incoming manifests.
//!
//! Every step works against a caller-owned [`Transaction`](crate::storage::Transaction);
//! a failure anywhere leaves the transaction to be dropped, discarding the
//! partial handler graph.

pub mod address;
pub mod contact;
pub mod handler;
pub mod manifest;
pub mod manifest_handler;
pub mod signature;

pub use address::AddressResolver;
pub use contact::ContactAssembler;
pub use handler::{HandlerRegistry, HandlerResolution};
pub use manifest::{ManifestAssembler, ManifestValidator};
pub use manifest_handler::{is_signed, load_view, ManifestHandlerAssembler};
pub use signature::SignatureAssembler;

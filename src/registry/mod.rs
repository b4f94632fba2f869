//! Registry access
//!
//! [`RegistryClient`] is the entry point; it talks to storage through a
//! [`RegistryTransport`]:
//! - [`HttpTransport`]: OCI distribution v2
//! - [`DirectoryTransport`]: local `file://` registry
//! - [`MemoryTransport`]: shared in-process registry for tests

mod client;
mod directory;
mod filter;
mod http;
pub mod memory;
mod transport;

pub use client::{PushOptions, RegistryClient, DOCUMENT_MEDIA_TYPE, SIGNATURE_MEDIA_TYPE};
pub use directory::DirectoryTransport;
pub use filter::{FilterError, TagFilter};
pub use http::HttpTransport;
pub use memory::{InjectedFailure, MemoryTransport, TransportOp};
pub use transport::{RegistryTransport, TransportError};

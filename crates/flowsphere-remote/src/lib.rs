//! Remote data access for FlowSphere.
//!
//! [`RemoteStore`] and [`AuthService`] describe the hosted backend the
//! application talks to. [`SupabaseClient`] implements them over HTTP and
//! [`MemoryBackend`] implements them in-process for offline use and tests.

/// Error types.
pub mod error;
/// In-process backend.
pub mod memory;
/// Collaborator traits and the query builder.
pub mod store;
/// HTTP client.
pub mod supabase;

pub use error::RemoteError;
pub use memory::MemoryBackend;
pub use store::{AuthService, Filter, Order, Query, RemoteStore, SignUpOutcome};
pub use supabase::SupabaseClient;

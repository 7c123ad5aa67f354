//! # fluorite-services
//!
//! The Service Adapter Contract and everything that produces adapters.
//!
//! - [`ServiceAdapter`]: the one trait every provider implements
//! - [`ServiceRegistry`]: static table of known providers and their constructors
//! - [`ServiceFactory`]: resolves a service name to a cached adapter instance
//! - [`providers`]: Vercel, Cloudflare, Supabase, Turso, AWS and GitHub adapters
//!
//! Adapters are cheap to construct. Credential lookup, CLI probing and network
//! access are deferred to the first call that needs them, so providers the user
//! never activates cost nothing.

mod adapter;
pub mod auth;
mod factory;
mod http;
pub mod probe;
pub mod providers;
mod registry;
pub mod testing;

pub use adapter::{require_capability, unsupported, within_timeout, ServiceAdapter};
pub use factory::ServiceFactory;
pub use http::ProviderApi;
pub use probe::{CommandOutput, CommandRunner, MockRunner, SystemRunner};
pub use registry::{AdapterConstructor, RegistryEntry, ServiceRegistry};

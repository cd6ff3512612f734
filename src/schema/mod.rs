//! Schema registry: turns a definition plus resolver bindings into the single immutable
//! `SchemaArtifact` that both transports execute against.

mod bindings;
mod coerce;
mod execute;
mod registry;

pub use bindings::{Binding, EventStream, FieldResolver, ResolverArgs, ResolverBindings, SubscriptionResolver};
pub use coerce::{coerce_input, serialize_leaf};
pub use execute::PreparedOperation;
pub use registry::{build, load_definition, SchemaArtifact, SharedSchema};

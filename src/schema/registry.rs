use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::bindings::{Binding, ResolverBindings};
use crate::error::SchemaBuildError;
use crate::graphql::{parse_schema, SchemaDefinition};

/// Immutable, executable schema shared by both transports.
pub struct SchemaArtifact {
    pub(crate) definition: SchemaDefinition,
    pub(crate) bindings: HashMap<String, HashMap<String, Binding>>,
}

pub type SharedSchema = Arc<SchemaArtifact>;

impl SchemaArtifact {
    pub fn definition(&self) -> &SchemaDefinition { &self.definition }

    pub fn binding(&self, type_name: &str, field: &str) -> Option<&Binding> {
        self.bindings.get(type_name).and_then(|m| m.get(field))
    }

    pub fn supports_subscriptions(&self) -> bool { self.definition.subscription_type.is_some() }
}

impl fmt::Debug for SchemaArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaArtifact")
            .field("query", &self.definition.query_type)
            .field("mutation", &self.definition.mutation_type)
            .field("subscription", &self.definition.subscription_type)
            .field("types", &self.definition.types.len())
            .finish()
    }
}

/// Read the schema definition file. Any I/O failure is an invalid definition.
pub fn load_definition(path: &Path) -> Result<String, SchemaBuildError> {
    std::fs::read_to_string(path)
        .map_err(|e| SchemaBuildError::invalid(format!("cannot read {}: {}", path.display(), e)))
}

/// Parse `source` and attach `bindings`. Every object field must end up with a binding,
/// and every binding must name a field that exists with a matching kind.
pub fn build(source: &str, bindings: ResolverBindings) -> Result<SchemaArtifact, SchemaBuildError> {
    let definition = parse_schema(source).map_err(|e| SchemaBuildError::invalid(e.to_string()))?;
    let subscription_root = definition.subscription_type.as_deref();

    for (type_name, fields) in &bindings.fields {
        let td = definition
            .get(type_name)
            .filter(|t| t.is_object())
            .ok_or_else(|| SchemaBuildError::invalid(format!("binding targets unknown object type {}", type_name)))?;
        let is_sub_root = subscription_root == Some(type_name.as_str());
        for (field, b) in fields {
            if td.field(field).is_none() {
                return Err(SchemaBuildError::invalid(format!("binding targets unknown field {}.{}", type_name, field)));
            }
            let expects_stream = matches!(b, Binding::Subscription(_));
            if expects_stream != is_sub_root {
                return Err(SchemaBuildError::invalid(format!(
                    "{} binding does not fit field {}.{}",
                    b.kind(),
                    type_name,
                    field
                )));
            }
        }
    }
    for type_name in &bindings.property_types {
        let ok = definition.get(type_name).map(|t| t.is_object()).unwrap_or(false);
        if !ok || subscription_root == Some(type_name.as_str()) {
            return Err(SchemaBuildError::invalid(format!("cannot bind properties of {}", type_name)));
        }
    }

    let mut resolved: HashMap<String, HashMap<String, Binding>> = HashMap::new();
    let mut explicit = bindings.fields;
    for td in definition.object_types() {
        let mut per_type = explicit.remove(&td.name).unwrap_or_default();
        let defaults = bindings.property_types.contains(&td.name);
        if let crate::graphql::TypeKind::Object(fields) = &td.kind {
            for f in fields {
                if per_type.contains_key(&f.name) { continue; }
                if !defaults {
                    return Err(SchemaBuildError::UnboundField { type_name: td.name.clone(), field: f.name.clone() });
                }
                per_type.insert(f.name.clone(), Binding::Property);
            }
        }
        debug!(target: "startup", type_name = %td.name, fields = per_type.len(), "bound object type");
        resolved.insert(td.name.clone(), per_type);
    }

    info!(target: "startup", types = resolved.len(), "schema built");
    Ok(SchemaArtifact { definition, bindings: resolved })
}

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use serde_json::{Map, Value};

use crate::graphql::FieldError;
use crate::identity::IdentityContext;

/// What a resolver sees: the parent object, coerced arguments and the caller identity.
pub struct ResolverArgs<'a> {
    pub parent: &'a Value,
    pub args: &'a Map<String, Value>,
    pub ctx: &'a IdentityContext,
}

impl<'a> ResolverArgs<'a> {
    pub fn arg(&self, name: &str) -> Option<&'a Value> { self.args.get(name) }

    pub fn arg_str(&self, name: &str) -> Option<&'a str> { self.args.get(name).and_then(Value::as_str) }

    /// Authenticated user name, or `UNAUTHENTICATED`.
    pub fn require_user(&self) -> Result<&'a str, FieldError> {
        self.ctx.user.as_deref().ok_or_else(FieldError::unauthenticated)
    }
}

pub type FieldResolver = Arc<dyn Fn(&ResolverArgs<'_>) -> Result<Value, FieldError> + Send + Sync>;
pub type EventStream = BoxStream<'static, Result<Value, FieldError>>;
pub type SubscriptionResolver = Arc<dyn Fn(&ResolverArgs<'_>) -> Result<EventStream, FieldError> + Send + Sync>;

#[derive(Clone)]
pub enum Binding {
    Resolver(FieldResolver),
    /// Read the same-named key from the parent object.
    Property,
    Subscription(SubscriptionResolver),
}

impl Binding {
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Resolver(_) => "resolver",
            Binding::Property => "property",
            Binding::Subscription(_) => "subscription",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.kind()) }
}

/// Builder mapping `(type, field)` to the code that produces its value.
#[derive(Clone, Default)]
pub struct ResolverBindings {
    pub(crate) fields: HashMap<String, HashMap<String, Binding>>,
    pub(crate) property_types: BTreeSet<String>,
}

impl ResolverBindings {
    pub fn new() -> Self { Self::default() }

    pub fn field<F>(self, type_name: &str, field: &str, f: F) -> Self
    where
        F: Fn(&ResolverArgs<'_>) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        self.insert(type_name, field, Binding::Resolver(Arc::new(f)))
    }

    pub fn subscription<F>(self, type_name: &str, field: &str, f: F) -> Self
    where
        F: Fn(&ResolverArgs<'_>) -> Result<EventStream, FieldError> + Send + Sync + 'static,
    {
        self.insert(type_name, field, Binding::Subscription(Arc::new(f)))
    }

    pub fn property(self, type_name: &str, field: &str) -> Self {
        self.insert(type_name, field, Binding::Property)
    }

    /// Every field of `type_name` without an explicit binding reads from its parent.
    pub fn bind_properties(mut self, type_name: &str) -> Self {
        self.property_types.insert(type_name.to_string());
        self
    }

    pub fn len(&self) -> usize { self.fields.values().map(HashMap::len).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 && self.property_types.is_empty() }

    fn insert(mut self, type_name: &str, field: &str, b: Binding) -> Self {
        self.fields.entry(type_name.to_string()).or_default().insert(field.to_string(), b);
        self
    }
}

impl fmt::Debug for ResolverBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(t, m)| m.keys().map(move |k| format!("{}.{}", t, k)))
            .collect();
        keys.sort();
        f.debug_struct("ResolverBindings")
            .field("fields", &keys)
            .field("property_types", &self.property_types)
            .finish()
    }
}

//! Validation and execution of operations against a built schema.
//! Non-null violations bubble null up to the nearest nullable position.

use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};

use super::bindings::{Binding, ResolverArgs};
use super::coerce::{coerce_input, serialize_leaf};
use super::registry::SchemaArtifact;
use crate::graphql::document::{InputValue, Operation, OperationKind};
use crate::graphql::sdl::{FieldDef, TypeRef};
use crate::graphql::{codes, parse_document, Field, FieldError, GraphQLError, GraphQLRequest, GraphQLResponse, PathSegment};
use crate::identity::IdentityContext;

/// A parsed, validated operation with its variables coerced.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub operation: Operation,
    pub root_type: String,
    pub variables: Map<String, Value>,
}

impl PreparedOperation {
    pub fn kind(&self) -> OperationKind { self.operation.kind }
}

fn validation(msg: impl Into<String>) -> GraphQLError {
    GraphQLError::new(msg, codes::VALIDATION_FAILED)
}

/// Marks a position that completed to null after its error was recorded.
struct Bubble;

impl SchemaArtifact {
    /// Parse, select, validate and coerce variables. Errors here are request-level.
    pub fn prepare(&self, req: &GraphQLRequest) -> Result<PreparedOperation, Vec<GraphQLError>> {
        let doc = parse_document(&req.query).map_err(|e| vec![GraphQLError::new(e.to_string(), codes::PARSE_FAILED)])?;
        let operation = doc
            .operation(req.operation_name.as_deref())
            .map_err(|m| vec![validation(m)])?
            .clone();
        let def = &self.definition;
        let root_type = match operation.kind {
            OperationKind::Query => Some(def.query_type.clone()),
            OperationKind::Mutation => def.mutation_type.clone(),
            OperationKind::Subscription => def.subscription_type.clone(),
        }
        .ok_or_else(|| vec![validation(format!("Schema is not configured for {} operations.", operation.kind.as_str()))])?;

        let mut errors = Vec::new();
        for used in operation.used_variables() {
            if !operation.variables.iter().any(|v| v.name == used) {
                errors.push(validation(format!("Variable \"${}\" is not defined.", used)));
            }
        }
        for v in &operation.variables {
            let input_type = def.get(v.ty.base_name()).map(|t| !t.is_object()).unwrap_or(false);
            if !input_type {
                errors.push(validation(format!("Variable \"${}\" cannot be non-input type \"{}\".", v.name, v.ty)));
            }
        }
        if operation.kind == OperationKind::Subscription
            && (operation.selection.len() != 1 || operation.selection[0].name == "__typename")
        {
            errors.push(validation("Subscription must select exactly one top level field."));
        }
        self.validate_selection(&root_type, &operation.selection, &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }

        let variables = self.coerce_variables(&operation, req.variables.as_ref()).map_err(|e| vec![e])?;
        Ok(PreparedOperation { operation, root_type, variables })
    }

    fn validate_selection(&self, type_name: &str, fields: &[Field], errors: &mut Vec<GraphQLError>) {
        let Some(td) = self.definition.get(type_name) else { return };
        for f in fields {
            if f.name == "__typename" {
                if !f.arguments.is_empty() || !f.selection.is_empty() {
                    errors.push(validation("__typename takes no arguments or selections."));
                }
                continue;
            }
            let Some(fdef) = td.field(&f.name) else {
                errors.push(validation(format!("Cannot query field \"{}\" on type \"{}\".", f.name, type_name)));
                continue;
            };
            for (an, _) in &f.arguments {
                if !fdef.args.iter().any(|a| &a.name == an) {
                    errors.push(validation(format!("Unknown argument \"{}\" on field \"{}.{}\".", an, type_name, f.name)));
                }
            }
            for a in &fdef.args {
                if a.ty.is_non_null() && a.default.is_none() && !f.arguments.iter().any(|(n, _)| n == &a.name) {
                    errors.push(validation(format!(
                        "Field \"{}\" argument \"{}\" of type \"{}\" is required, but it was not provided.",
                        f.name, a.name, a.ty
                    )));
                }
            }
            let target = fdef.ty.base_name();
            let leaf = self.definition.get(target).map(|t| t.is_leaf()).unwrap_or(true);
            match (leaf, f.selection.is_empty()) {
                (true, false) => errors.push(validation(format!(
                    "Field \"{}\" must not have a selection since type \"{}\" has no subfields.",
                    f.name, fdef.ty
                ))),
                (false, true) => errors.push(validation(format!(
                    "Field \"{}\" of type \"{}\" must have a selection of subfields.",
                    f.name, fdef.ty
                ))),
                (false, false) => self.validate_selection(target, &f.selection, errors),
                (true, true) => {}
            }
        }
    }

    fn coerce_variables(&self, op: &Operation, provided: Option<&Map<String, Value>>) -> Result<Map<String, Value>, GraphQLError> {
        let mut out = Map::new();
        for v in &op.variables {
            let bad = |m: String| GraphQLError::new(format!("Variable \"${}\" got invalid value; {}", v.name, m), codes::BAD_USER_INPUT);
            match (provided.and_then(|p| p.get(&v.name)), &v.default) {
                (Some(given), _) => { out.insert(v.name.clone(), coerce_input(&self.definition, &v.ty, given).map_err(bad)?); }
                (None, Some(d)) => { out.insert(v.name.clone(), coerce_input(&self.definition, &v.ty, d).map_err(bad)?); }
                (None, None) if v.ty.is_non_null() => {
                    return Err(GraphQLError::new(
                        format!("Variable \"${}\" of required type \"{}\" was not provided.", v.name, v.ty),
                        codes::BAD_USER_INPUT,
                    ));
                }
                (None, None) => {}
            }
        }
        Ok(out)
    }

    fn coerce_arguments(&self, fdef: &FieldDef, field: &Field, vars: &Map<String, Value>) -> Result<Map<String, Value>, FieldError> {
        let mut out = Map::new();
        for a in &fdef.args {
            let given = field.arguments.iter().find(|(n, _)| n == &a.name).map(|(_, v)| v);
            let given = match given {
                // An unset variable behaves like an omitted argument.
                Some(InputValue::Variable(n)) if !vars.contains_key(n) => None,
                other => other,
            };
            let value = match (given, &a.default) {
                (Some(v), _) => v.resolve(vars),
                (None, Some(d)) => d.clone(),
                (None, None) if a.ty.is_non_null() => {
                    return Err(FieldError::bad_input(format!("Argument \"{}\" of required type \"{}\" was not provided.", a.name, a.ty)));
                }
                (None, None) => continue,
            };
            let coerced = coerce_input(&self.definition, &a.ty, &value)
                .map_err(|m| FieldError::bad_input(format!("Argument \"{}\" has invalid value: {}", a.name, m)))?;
            out.insert(a.name.clone(), coerced);
        }
        Ok(out)
    }

    /// Run a query or mutation. Subscriptions go through `subscribe`.
    pub fn execute_prepared(&self, prepared: &PreparedOperation, ctx: &IdentityContext) -> GraphQLResponse {
        if prepared.kind() == OperationKind::Subscription {
            return GraphQLResponse::from_errors(vec![validation("Subscriptions require the WebSocket transport.")]);
        }
        let mut ex = Executor::new(self, &prepared.variables, ctx);
        let data = ex
            .selection(&prepared.root_type, &Value::Null, &prepared.operation.selection)
            .unwrap_or(Value::Null);
        GraphQLResponse { data: Some(data), errors: ex.errors }
    }

    pub fn execute(&self, req: &GraphQLRequest, ctx: &IdentityContext) -> GraphQLResponse {
        match self.prepare(req) {
            Ok(p) => self.execute_prepared(&p, ctx),
            Err(errors) => GraphQLResponse::from_errors(errors),
        }
    }

    /// Start a subscription: call the root field's source and map each event through
    /// the selection set. Errors before the first event come back as `Err`.
    pub fn subscribe(
        self: &Arc<Self>,
        prepared: PreparedOperation,
        ctx: IdentityContext,
    ) -> Result<BoxStream<'static, GraphQLResponse>, Vec<GraphQLError>> {
        if prepared.kind() != OperationKind::Subscription {
            return Err(vec![validation("Operation is not a subscription.")]);
        }
        let field = &prepared.operation.selection[0];
        let path = [PathSegment::Key(field.response_key().to_string())];
        let fdef = self
            .definition
            .get(&prepared.root_type)
            .and_then(|t| t.field(&field.name))
            .ok_or_else(|| vec![validation(format!("Unknown subscription field \"{}\".", field.name))])?;
        let to_errors = |e: FieldError| vec![GraphQLError::new(e.message, &e.code).at(&path)];
        let args = self.coerce_arguments(fdef, field, &prepared.variables).map_err(to_errors)?;
        let Some(Binding::Subscription(source)) = self.binding(&prepared.root_type, &field.name) else {
            return Err(vec![GraphQLError::new("subscription field has no event source", codes::INTERNAL).at(&path)]);
        };
        let events = source(&ResolverArgs { parent: &Value::Null, args: &args, ctx: &ctx }).map_err(to_errors)?;
        let schema = Arc::clone(self);
        Ok(events.map(move |event| schema.complete_event(&prepared, &ctx, event)).boxed())
    }

    fn complete_event(&self, prepared: &PreparedOperation, ctx: &IdentityContext, event: Result<Value, FieldError>) -> GraphQLResponse {
        let field = &prepared.operation.selection[0];
        let Some(fdef) = self.definition.get(&prepared.root_type).and_then(|t| t.field(&field.name)) else {
            return GraphQLResponse::from_errors(vec![GraphQLError::new("subscription field vanished", codes::INTERNAL)]);
        };
        let key = field.response_key().to_string();
        let mut ex = Executor::new(self, &prepared.variables, ctx);
        ex.path.push(PathSegment::Key(key.clone()));
        let label = format!("{}.{}", prepared.root_type, field.name);
        let value = match event {
            Ok(v) => ex.complete(&fdef.ty, &field.selection, v, &label),
            Err(e) => {
                ex.field_error(e);
                if fdef.ty.is_non_null() { Err(Bubble) } else { Ok(Value::Null) }
            }
        };
        ex.path.pop();
        let data = match value {
            Ok(v) => {
                let mut m = Map::new();
                m.insert(key, v);
                Value::Object(m)
            }
            Err(Bubble) => Value::Null,
        };
        GraphQLResponse { data: Some(data), errors: ex.errors }
    }
}

struct Executor<'a> {
    schema: &'a SchemaArtifact,
    vars: &'a Map<String, Value>,
    ctx: &'a IdentityContext,
    path: Vec<PathSegment>,
    errors: Vec<GraphQLError>,
}

impl<'a> Executor<'a> {
    fn new(schema: &'a SchemaArtifact, vars: &'a Map<String, Value>, ctx: &'a IdentityContext) -> Self {
        Self { schema, vars, ctx, path: Vec::new(), errors: Vec::new() }
    }

    fn field_error(&mut self, e: FieldError) {
        self.errors.push(GraphQLError::new(e.message, &e.code).at(&self.path));
    }

    fn error(&mut self, message: String) {
        self.errors.push(GraphQLError::new(message, codes::INTERNAL).at(&self.path));
    }

    fn selection(&mut self, type_name: &str, parent: &Value, fields: &[Field]) -> Result<Value, Bubble> {
        let mut out = Map::new();
        for f in fields {
            let key = f.response_key().to_string();
            if f.name == "__typename" {
                out.insert(key, Value::String(type_name.to_string()));
                continue;
            }
            self.path.push(PathSegment::Key(key.clone()));
            let value = self.field(type_name, parent, f);
            self.path.pop();
            out.insert(key, value?);
        }
        Ok(Value::Object(out))
    }

    fn field(&mut self, type_name: &str, parent: &Value, f: &Field) -> Result<Value, Bubble> {
        let schema = self.schema;
        let Some(fdef) = schema.definition.get(type_name).and_then(|t| t.field(&f.name)) else {
            return Ok(Value::Null);
        };
        let resolved = schema
            .coerce_arguments(fdef, f, self.vars)
            .and_then(|args| match schema.binding(type_name, &f.name) {
                Some(Binding::Resolver(r)) => r(&ResolverArgs { parent, args: &args, ctx: self.ctx }),
                Some(Binding::Property) | None => Ok(parent.get(&f.name).cloned().unwrap_or(Value::Null)),
                Some(Binding::Subscription(_)) => Err(FieldError::new("subscription fields are only resolved through subscribe")),
            });
        match resolved {
            Ok(v) => self.complete(&fdef.ty, &f.selection, v, &format!("{}.{}", type_name, f.name)),
            Err(e) => {
                self.field_error(e);
                if fdef.ty.is_non_null() { Err(Bubble) } else { Ok(Value::Null) }
            }
        }
    }

    fn complete(&mut self, ty: &TypeRef, sel: &[Field], v: Value, label: &str) -> Result<Value, Bubble> {
        match ty {
            TypeRef::NonNull(inner) => {
                let out = self.complete_nullable(inner, sel, v, label)?;
                if out.is_null() {
                    self.error(format!("Cannot return null for non-nullable field {}.", label));
                    return Err(Bubble);
                }
                Ok(out)
            }
            other => Ok(self.complete_nullable(other, sel, v, label).unwrap_or(Value::Null)),
        }
    }

    fn complete_nullable(&mut self, ty: &TypeRef, sel: &[Field], v: Value, label: &str) -> Result<Value, Bubble> {
        if v.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            TypeRef::NonNull(_) => self.complete(ty, sel, v, label),
            TypeRef::List(inner) => {
                let Value::Array(items) = v else {
                    self.error(format!("Expected a list for field {}.", label));
                    return Err(Bubble);
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    self.path.push(PathSegment::Index(i));
                    let r = self.complete(inner, sel, item, label);
                    self.path.pop();
                    out.push(r?);
                }
                Ok(Value::Array(out))
            }
            TypeRef::Named(name) => {
                let is_object = self.schema.definition.get(name).map(|t| t.is_object()).unwrap_or(false);
                if is_object {
                    return self.selection(name, &v, sel);
                }
                match serialize_leaf(&self.schema.definition, name, &v) {
                    Ok(out) => Ok(out),
                    Err(m) => {
                        self.error(m);
                        Err(Bubble)
                    }
                }
            }
        }
    }
}

//! Schema definition language: parse type definitions into a `SchemaDefinition` and
//! check that every type reference resolves.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::document::parse_const_value;
use super::lexer::{Cursor, SyntaxError, Tok};

pub const BUILTIN_SCALARS: &[&str] = &["Int", "Float", "String", "Boolean", "ID"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(n) => n,
            TypeRef::List(t) | TypeRef::NonNull(t) => t.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool { matches!(self, TypeRef::NonNull(_)) }

    pub(crate) fn parse(cur: &mut Cursor) -> Result<Self, SyntaxError> {
        let inner = if cur.eat_punct('[') {
            cur.descend()?;
            let t = TypeRef::parse(cur)?;
            cur.expect_punct(']')?;
            cur.ascend();
            TypeRef::List(Box::new(t))
        } else {
            TypeRef::Named(cur.expect_name()?)
        };
        if cur.eat_punct('!') { Ok(TypeRef::NonNull(Box::new(inner))) } else { Ok(inner) }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(n) => f.write_str(n),
            TypeRef::List(t) => write!(f, "[{}]", t),
            TypeRef::NonNull(t) => write!(f, "{}!", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub args: Vec<InputValueDef>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Object(Vec<FieldDef>),
    Input(Vec<InputValueDef>),
    Enum(Vec<String>),
    Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match &self.kind {
            TypeKind::Object(fields) => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool { matches!(self.kind, TypeKind::Object(_)) }

    /// Scalars and enums complete to themselves; objects need a selection set.
    pub fn is_leaf(&self) -> bool { matches!(self.kind, TypeKind::Scalar | TypeKind::Enum(_)) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    pub types: BTreeMap<String, TypeDef>,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
}

impl SchemaDefinition {
    pub fn get(&self, name: &str) -> Option<&TypeDef> { self.types.get(name) }

    pub fn object_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values().filter(|t| t.is_object())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Semantic(String),
}

pub fn parse_schema(src: &str) -> Result<SchemaDefinition, DefinitionError> {
    let mut cur = Cursor::new(src)?;
    let mut types: BTreeMap<String, TypeDef> = BTreeMap::new();
    let mut roots: Option<(Option<String>, Option<String>, Option<String>)> = None;

    for s in BUILTIN_SCALARS {
        types.insert(s.to_string(), TypeDef { name: s.to_string(), kind: TypeKind::Scalar });
    }

    while !cur.at_end() {
        // Descriptions attach to the following definition and are dropped.
        if matches!(cur.peek(), Tok::Str(_)) { cur.next(); continue; }
        let keyword = cur.expect_name()?;
        match keyword.as_str() {
            "schema" => {
                skip_directives(&mut cur)?;
                if roots.is_some() { return Err(DefinitionError::Semantic("duplicate schema definition".into())); }
                roots = Some(parse_schema_roots(&mut cur)?);
            }
            "type" | "input" | "enum" | "scalar" => {
                let name = cur.expect_name()?;
                if cur.is_name("implements") {
                    return Err(cur.pos().error("interfaces are not supported").into());
                }
                skip_directives(&mut cur)?;
                let kind = match keyword.as_str() {
                    "type" => TypeKind::Object(parse_fields(&mut cur, &name)?),
                    "input" => TypeKind::Input(parse_input_fields(&mut cur, &name)?),
                    "enum" => TypeKind::Enum(parse_enum_values(&mut cur, &name)?),
                    _ => TypeKind::Scalar,
                };
                if types.contains_key(&name) {
                    return Err(DefinitionError::Semantic(format!("type {} defined more than once", name)));
                }
                types.insert(name.clone(), TypeDef { name, kind });
            }
            other => {
                return Err(cur.pos().error(format!("unsupported definition '{}'", other)).into());
            }
        }
    }

    let (query, mutation, subscription) = roots.unwrap_or_else(|| {
        let present = |n: &str| types.contains_key(n).then(|| n.to_string());
        (present("Query"), present("Mutation"), present("Subscription"))
    });
    let query_type = query.ok_or_else(|| DefinitionError::Semantic("schema has no Query type".into()))?;
    let def = SchemaDefinition { types, query_type, mutation_type: mutation, subscription_type: subscription };
    check_references(&def)?;
    Ok(def)
}

fn parse_schema_roots(cur: &mut Cursor) -> Result<(Option<String>, Option<String>, Option<String>), SyntaxError> {
    cur.expect_punct('{')?;
    let (mut q, mut m, mut s) = (None, None, None);
    while !cur.eat_punct('}') {
        let op = cur.expect_name()?;
        cur.expect_punct(':')?;
        let ty = cur.expect_name()?;
        match op.as_str() {
            "query" => q = Some(ty),
            "mutation" => m = Some(ty),
            "subscription" => s = Some(ty),
            other => return Err(cur.pos().error(format!("unknown operation type '{}'", other))),
        }
    }
    Ok((q, m, s))
}

fn skip_directives(cur: &mut Cursor) -> Result<(), SyntaxError> {
    while cur.eat_punct('@') {
        cur.expect_name()?;
        if cur.eat_punct('(') {
            while !cur.eat_punct(')') {
                cur.expect_name()?;
                cur.expect_punct(':')?;
                parse_const_value(cur)?;
            }
        }
    }
    Ok(())
}

fn skip_description(cur: &mut Cursor) {
    if matches!(cur.peek(), Tok::Str(_)) { cur.next(); }
}

fn parse_fields(cur: &mut Cursor, owner: &str) -> Result<Vec<FieldDef>, DefinitionError> {
    let mut fields: Vec<FieldDef> = Vec::new();
    cur.expect_punct('{')?;
    while !cur.eat_punct('}') {
        skip_description(cur);
        let name = cur.expect_name()?;
        let args = if cur.eat_punct('(') { parse_input_values(cur, ')')? } else { Vec::new() };
        cur.expect_punct(':')?;
        let ty = TypeRef::parse(cur)?;
        skip_directives(cur)?;
        if fields.iter().any(|f| f.name == name) {
            return Err(DefinitionError::Semantic(format!("field {}.{} defined more than once", owner, name)));
        }
        fields.push(FieldDef { name, args, ty });
    }
    if fields.is_empty() {
        return Err(DefinitionError::Semantic(format!("type {} has no fields", owner)));
    }
    Ok(fields)
}

fn parse_input_fields(cur: &mut Cursor, owner: &str) -> Result<Vec<InputValueDef>, DefinitionError> {
    cur.expect_punct('{')?;
    let fields = parse_input_values(cur, '}')?;
    if fields.is_empty() {
        return Err(DefinitionError::Semantic(format!("input {} has no fields", owner)));
    }
    Ok(fields)
}

fn parse_input_values(cur: &mut Cursor, close: char) -> Result<Vec<InputValueDef>, DefinitionError> {
    let mut out = Vec::new();
    while !cur.eat_punct(close) {
        skip_description(cur);
        let name = cur.expect_name()?;
        cur.expect_punct(':')?;
        let ty = TypeRef::parse(cur)?;
        let default = if cur.eat_punct('=') { Some(parse_const_value(cur)?) } else { None };
        skip_directives(cur)?;
        out.push(InputValueDef { name, ty, default });
    }
    Ok(out)
}

fn parse_enum_values(cur: &mut Cursor, owner: &str) -> Result<Vec<String>, DefinitionError> {
    let mut out: Vec<String> = Vec::new();
    cur.expect_punct('{')?;
    while !cur.eat_punct('}') {
        skip_description(cur);
        let v = cur.expect_name()?;
        skip_directives(cur)?;
        if out.contains(&v) {
            return Err(DefinitionError::Semantic(format!("enum {} repeats value {}", owner, v)));
        }
        out.push(v);
    }
    Ok(out)
}

fn check_references(def: &SchemaDefinition) -> Result<(), DefinitionError> {
    let missing = |name: &str| DefinitionError::Semantic(format!("unknown type {}", name));
    for root in [Some(&def.query_type), def.mutation_type.as_ref(), def.subscription_type.as_ref()].into_iter().flatten() {
        match def.get(root) {
            Some(t) if t.is_object() => {}
            Some(_) => return Err(DefinitionError::Semantic(format!("root type {} must be an object type", root))),
            None => return Err(missing(root)),
        }
    }
    let input_kind_ok = |name: &str| matches!(def.get(name).map(|t| &t.kind), Some(TypeKind::Scalar | TypeKind::Enum(_) | TypeKind::Input(_)));
    for t in def.types.values() {
        match &t.kind {
            TypeKind::Object(fields) => {
                for f in fields {
                    let target = f.ty.base_name();
                    match def.get(target) {
                        Some(TypeDef { kind: TypeKind::Input(_), .. }) => {
                            return Err(DefinitionError::Semantic(format!("field {}.{} cannot return input type {}", t.name, f.name, target)));
                        }
                        Some(_) => {}
                        None => return Err(missing(target)),
                    }
                    for a in &f.args {
                        if def.get(a.ty.base_name()).is_none() { return Err(missing(a.ty.base_name())); }
                        if !input_kind_ok(a.ty.base_name()) {
                            return Err(DefinitionError::Semantic(format!("argument {}.{}({}) must be an input type", t.name, f.name, a.name)));
                        }
                    }
                }
            }
            TypeKind::Input(fields) => {
                for f in fields {
                    if def.get(f.ty.base_name()).is_none() { return Err(missing(f.ty.base_name())); }
                    if !input_kind_ok(f.ty.base_name()) {
                        return Err(DefinitionError::Semantic(format!("input field {}.{} must be an input type", t.name, f.name)));
                    }
                }
            }
            TypeKind::Enum(_) | TypeKind::Scalar => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: &str = r#"
        "A chat message"
        type Message {
            id: ID!
            user: String!
            text: String!
        }

        type Query {
            messages(limit: Int = 10): [Message!]
        }

        type Mutation {
            addMessage(input: MessageInput!): Message
        }

        type Subscription { messageAdded: Message }

        input MessageInput { text: String! }
        enum Mood { HAPPY SAD }
        scalar DateTime
    "#;

    #[test]
    fn parses_types_and_roots() {
        let def = parse_schema(CHAT).unwrap();
        assert_eq!(def.query_type, "Query");
        assert_eq!(def.mutation_type.as_deref(), Some("Mutation"));
        assert_eq!(def.subscription_type.as_deref(), Some("Subscription"));
        let q = def.get("Query").unwrap().field("messages").unwrap();
        assert_eq!(q.ty.to_string(), "[Message!]");
        assert_eq!(q.args[0].default, Some(serde_json::json!(10)));
        assert!(def.get("Mood").unwrap().is_leaf());
        assert!(def.get("DateTime").unwrap().is_leaf());
        assert_eq!(def.object_types().count(), 4);
    }

    #[test]
    fn explicit_schema_block() {
        let def = parse_schema("schema { query: Root } type Root { ok: Boolean }").unwrap();
        assert_eq!(def.query_type, "Root");
        assert_eq!(def.mutation_type, None);
    }

    #[test]
    fn rejects_invalid_definitions() {
        for (src, needle) in [
            ("type Mutation { x: Int }", "no Query"),
            ("type Query { w: Widget }", "unknown type Widget"),
            ("type Query { a: Int a: Int }", "more than once"),
            ("type Query { a: Int } type Query { b: Int }", "more than once"),
            ("type Query { a(x: Query): Int }", "must be an input type"),
            ("input I { a: Int } type Query { i: I }", "cannot return input"),
            ("type Query { a: Int", "expected"),
            ("interface Node { id: ID }", "unsupported definition"),
            (&*format!("type Query {{ a: {}Int{} }}", "[".repeat(5_000), "]".repeat(5_000)), "nesting"),
            (&*format!("type Query {{ a(x: Int = {}1{}): Int }}", "[".repeat(5_000), "]".repeat(5_000)), "nesting"),
        ] {
            let err = parse_schema(src).unwrap_err().to_string();
            assert!(err.contains(needle), "{} -> {}", src, err);
        }
    }
}

//! Executable documents: operations, variable definitions and selection sets.
//! Fragments are not part of the supported subset.

use serde_json::{Map, Number, Value};

use super::lexer::{Cursor, SyntaxError, Tok};
use super::sdl::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

/// Argument value as written in the document, before variable substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Variable(String),
    Const(Value),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

impl InputValue {
    pub fn resolve(&self, vars: &Map<String, Value>) -> Value {
        match self {
            InputValue::Variable(n) => vars.get(n).cloned().unwrap_or(Value::Null),
            InputValue::Const(v) => v.clone(),
            InputValue::List(items) => Value::Array(items.iter().map(|i| i.resolve(vars)).collect()),
            InputValue::Object(fields) => {
                Value::Object(fields.iter().map(|(k, v)| (k.clone(), v.resolve(vars))).collect())
            }
        }
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            InputValue::Variable(n) => out.push(n),
            InputValue::Const(_) => {}
            InputValue::List(items) => items.iter().for_each(|i| i.collect_variables(out)),
            InputValue::Object(fields) => fields.iter().for_each(|(_, v)| v.collect_variables(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub selection: Vec<Field>,
}

impl Field {
    /// Key under which the field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDef>,
    pub selection: Vec<Field>,
}

impl Operation {
    pub fn used_variables(&self) -> Vec<&str> {
        fn walk<'a>(fields: &'a [Field], out: &mut Vec<&'a str>) {
            for f in fields {
                for (_, v) in &f.arguments { v.collect_variables(out); }
                walk(&f.selection, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.selection, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<Operation>,
}

impl Document {
    /// Pick the operation to run: by name, or the only one present.
    pub fn operation(&self, name: Option<&str>) -> Result<&Operation, String> {
        match name {
            Some(n) => self
                .operations
                .iter()
                .find(|o| o.name.as_deref() == Some(n))
                .ok_or_else(|| format!("unknown operation named \"{}\"", n)),
            None if self.operations.len() == 1 => Ok(&self.operations[0]),
            None => Err("must provide operation name if query contains multiple operations".to_string()),
        }
    }
}

pub fn parse_document(src: &str) -> Result<Document, SyntaxError> {
    let mut cur = Cursor::new(src)?;
    let mut operations = Vec::new();
    while !cur.at_end() {
        operations.push(parse_operation(&mut cur)?);
    }
    if operations.is_empty() {
        return Err(cur.pos().error("document contains no operations"));
    }
    Ok(Document { operations })
}

fn parse_operation(cur: &mut Cursor) -> Result<Operation, SyntaxError> {
    if cur.is_punct('{') {
        return Ok(Operation { kind: OperationKind::Query, name: None, variables: Vec::new(), selection: parse_selection_set(cur)? });
    }
    let kind = match cur.peek() {
        Tok::Name(n) if n == "query" => OperationKind::Query,
        Tok::Name(n) if n == "mutation" => OperationKind::Mutation,
        Tok::Name(n) if n == "subscription" => OperationKind::Subscription,
        Tok::Name(n) if n == "fragment" => return Err(cur.pos().error("fragments are not supported")),
        _ => return Err(cur.unexpected("an operation")),
    };
    cur.next();
    let name = match cur.peek() {
        Tok::Name(_) => Some(cur.expect_name()?),
        _ => None,
    };
    let mut variables = Vec::new();
    if cur.eat_punct('(') {
        while !cur.eat_punct(')') {
            cur.expect_punct('$')?;
            let vname = cur.expect_name()?;
            cur.expect_punct(':')?;
            let ty = TypeRef::parse(cur)?;
            let default = if cur.eat_punct('=') { Some(parse_const_value(cur)?) } else { None };
            if variables.iter().any(|v: &VariableDef| v.name == vname) {
                return Err(cur.pos().error(format!("variable ${} declared more than once", vname)));
            }
            variables.push(VariableDef { name: vname, ty, default });
        }
    }
    skip_directives(cur)?;
    let selection = parse_selection_set(cur)?;
    Ok(Operation { kind, name, variables, selection })
}

fn parse_selection_set(cur: &mut Cursor) -> Result<Vec<Field>, SyntaxError> {
    cur.expect_punct('{')?;
    cur.descend()?;
    let mut fields = Vec::new();
    while !cur.eat_punct('}') {
        if matches!(cur.peek(), Tok::Spread) {
            return Err(cur.pos().error("fragments are not supported"));
        }
        fields.push(parse_field(cur)?);
    }
    if fields.is_empty() {
        return Err(cur.pos().error("selection set must not be empty"));
    }
    cur.ascend();
    Ok(fields)
}

fn parse_field(cur: &mut Cursor) -> Result<Field, SyntaxError> {
    let first = cur.expect_name()?;
    let (alias, name) = if cur.eat_punct(':') { (Some(first), cur.expect_name()?) } else { (None, first) };
    let mut arguments = Vec::new();
    if cur.eat_punct('(') {
        while !cur.eat_punct(')') {
            let an = cur.expect_name()?;
            cur.expect_punct(':')?;
            arguments.push((an, parse_value(cur)?));
        }
    }
    skip_directives(cur)?;
    let selection = if cur.is_punct('{') { parse_selection_set(cur)? } else { Vec::new() };
    Ok(Field { alias, name, arguments, selection })
}

fn skip_directives(cur: &mut Cursor) -> Result<(), SyntaxError> {
    if cur.is_punct('@') {
        return Err(cur.pos().error("directives are not supported in operations"));
    }
    Ok(())
}

fn parse_value(cur: &mut Cursor) -> Result<InputValue, SyntaxError> {
    if cur.eat_punct('$') {
        return Ok(InputValue::Variable(cur.expect_name()?));
    }
    if cur.eat_punct('[') {
        cur.descend()?;
        let mut items = Vec::new();
        while !cur.eat_punct(']') { items.push(parse_value(cur)?); }
        cur.ascend();
        return Ok(InputValue::List(items));
    }
    if cur.eat_punct('{') {
        cur.descend()?;
        let mut fields = Vec::new();
        while !cur.eat_punct('}') {
            let k = cur.expect_name()?;
            cur.expect_punct(':')?;
            fields.push((k, parse_value(cur)?));
        }
        cur.ascend();
        return Ok(InputValue::Object(fields));
    }
    Ok(InputValue::Const(parse_scalar(cur)?))
}

/// Literal value with no variables; used for defaults in both SDL and operations.
pub fn parse_const_value(cur: &mut Cursor) -> Result<Value, SyntaxError> {
    if cur.is_punct('$') {
        return Err(cur.pos().error("variables are not allowed here"));
    }
    if cur.eat_punct('[') {
        cur.descend()?;
        let mut items = Vec::new();
        while !cur.eat_punct(']') { items.push(parse_const_value(cur)?); }
        cur.ascend();
        return Ok(Value::Array(items));
    }
    if cur.eat_punct('{') {
        cur.descend()?;
        let mut m = Map::new();
        while !cur.eat_punct('}') {
            let k = cur.expect_name()?;
            cur.expect_punct(':')?;
            m.insert(k, parse_const_value(cur)?);
        }
        cur.ascend();
        return Ok(Value::Object(m));
    }
    parse_scalar(cur)
}

fn parse_scalar(cur: &mut Cursor) -> Result<Value, SyntaxError> {
    let pos = cur.pos();
    match cur.next() {
        Tok::Int(i) => Ok(Value::Number(i.into())),
        Tok::Float(f) => Number::from_f64(f).map(Value::Number).ok_or_else(|| pos.error("non-finite float")),
        Tok::Str(s) => Ok(Value::String(s)),
        Tok::Name(n) => Ok(match n.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            // Enum values travel as their names.
            _ => Value::String(n),
        }),
        other => Err(pos.error(format!("expected a value, found {}", other))),
    }
}

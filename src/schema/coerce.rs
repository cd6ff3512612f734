//! Value coercion against schema types: inputs (variables, arguments) and leaf outputs.

use serde_json::{Map, Value};

use crate::graphql::sdl::{InputValueDef, SchemaDefinition, TypeKind, TypeRef};

fn show(v: &Value) -> String { v.to_string() }

/// Coerce an input value to `ty`. `Null` is accepted for nullable positions only.
pub fn coerce_input(def: &SchemaDefinition, ty: &TypeRef, value: &Value) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(format!("Expected non-nullable type \"{}\" not to be null.", ty));
            }
            coerce_input(def, inner, value)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items.iter().map(|i| coerce_input(def, inner, i)).collect::<Result<Vec<_>, _>>().map(Value::Array),
            // A single value is accepted where a list is expected.
            single => Ok(Value::Array(vec![coerce_input(def, inner, single)?])),
        },
        TypeRef::Named(name) => coerce_named_input(def, name, value),
    }
}

fn coerce_named_input(def: &SchemaDefinition, name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => match value.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Ok(value.clone()),
            _ => Err(format!("Int cannot represent non-integer value: {}", show(value))),
        },
        "Float" if value.is_number() => Ok(value.clone()),
        "Float" => Err(format!("Float cannot represent non numeric value: {}", show(value))),
        "String" if value.is_string() => Ok(value.clone()),
        "String" => Err(format!("String cannot represent a non string value: {}", show(value))),
        "Boolean" if value.is_boolean() => Ok(value.clone()),
        "Boolean" => Err(format!("Boolean cannot represent a non boolean value: {}", show(value))),
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {}", show(value))),
        },
        _ => {
            let td = def.get(name).ok_or_else(|| format!("Unknown type \"{}\".", name))?;
            match &td.kind {
                TypeKind::Scalar => Ok(value.clone()),
                TypeKind::Enum(values) => match value.as_str() {
                    Some(s) if values.iter().any(|v| v == s) => Ok(value.clone()),
                    _ => Err(format!("Value {} does not exist in \"{}\" enum.", show(value), name)),
                },
                TypeKind::Input(fields) => {
                    let obj = value
                        .as_object()
                        .ok_or_else(|| format!("Expected type \"{}\" to be an object.", name))?;
                    coerce_input_object(def, name, fields, obj)
                }
                TypeKind::Object(_) => Err(format!("\"{}\" is not an input type.", name)),
            }
        }
    }
}

fn coerce_input_object(
    def: &SchemaDefinition,
    name: &str,
    fields: &[InputValueDef],
    obj: &Map<String, Value>,
) -> Result<Value, String> {
    if let Some(unknown) = obj.keys().find(|k| !fields.iter().any(|f| &f.name == *k)) {
        return Err(format!("Field \"{}\" is not defined by type \"{}\".", unknown, name));
    }
    let mut out = Map::new();
    for f in fields {
        match (obj.get(&f.name), &f.default) {
            (Some(v), _) => { out.insert(f.name.clone(), coerce_input(def, &f.ty, v)?); }
            (None, Some(d)) => { out.insert(f.name.clone(), coerce_input(def, &f.ty, d)?); }
            (None, None) if f.ty.is_non_null() => {
                return Err(format!("Field \"{}.{}\" of required type \"{}\" was not provided.", name, f.name, f.ty));
            }
            (None, None) => {}
        }
    }
    Ok(Value::Object(out))
}

/// Serialize a resolved scalar or enum value for the response.
pub fn serialize_leaf(def: &SchemaDefinition, name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => value
            .as_i64()
            .filter(|i| i32::try_from(*i).is_ok())
            .map(|_| value.clone())
            .ok_or_else(|| format!("Int cannot represent non-integer value: {}", show(value))),
        "Float" if value.is_number() => Ok(value.clone()),
        "Float" => Err(format!("Float cannot represent non numeric value: {}", show(value))),
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(_) | Value::Bool(_) => Ok(Value::String(value.to_string())),
            _ => Err(format!("String cannot represent value: {}", show(value))),
        },
        "Boolean" if value.is_boolean() => Ok(value.clone()),
        "Boolean" => Err(format!("Boolean cannot represent a non boolean value: {}", show(value))),
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {}", show(value))),
        },
        _ => match def.get(name).map(|t| &t.kind) {
            Some(TypeKind::Enum(values)) => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(value.clone()),
                _ => Err(format!("Enum \"{}\" cannot represent value: {}", name, show(value))),
            },
            _ => Ok(value.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::parse_schema;
    use serde_json::json;

    fn def() -> SchemaDefinition {
        parse_schema(
            r#"
            type Query { a: Int }
            enum Mood { HAPPY SAD }
            input Post { text: String!, mood: Mood = HAPPY, tags: [String!] }
            "#,
        )
        .unwrap()
    }

    fn ty(src: &str) -> TypeRef {
        let mut cur = crate::graphql::lexer::Cursor::new(src).unwrap();
        TypeRef::parse(&mut cur).unwrap()
    }

    #[test]
    fn scalars_and_nullability() {
        let d = def();
        assert_eq!(coerce_input(&d, &ty("Int"), &json!(3)).unwrap(), json!(3));
        assert!(coerce_input(&d, &ty("Int"), &json!(1.5)).is_err());
        assert!(coerce_input(&d, &ty("Int"), &json!(5_000_000_000i64)).is_err());
        assert_eq!(coerce_input(&d, &ty("ID"), &json!(7)).unwrap(), json!("7"));
        assert_eq!(coerce_input(&d, &ty("String"), &Value::Null).unwrap(), Value::Null);
        assert!(coerce_input(&d, &ty("String!"), &Value::Null).unwrap_err().contains("String!"));
    }

    #[test]
    fn lists_wrap_single_values() {
        let d = def();
        assert_eq!(coerce_input(&d, &ty("[Int]"), &json!(1)).unwrap(), json!([1]));
        assert!(coerce_input(&d, &ty("[Int!]"), &json!([1, null])).is_err());
    }

    #[test]
    fn input_objects_fill_defaults_and_reject_unknown_fields() {
        let d = def();
        let post = ty("Post");
        assert_eq!(coerce_input(&d, &post, &json!({"text": "hi"})).unwrap(), json!({"text": "hi", "mood": "HAPPY"}));
        assert!(coerce_input(&d, &post, &json!({"mood": "SAD"})).unwrap_err().contains("Post.text"));
        assert!(coerce_input(&d, &post, &json!({"text": "x", "extra": 1})).is_err());
        assert!(coerce_input(&d, &post, &json!({"text": "x", "mood": "ANGRY"})).is_err());
    }

    #[test]
    fn leaf_serialization() {
        let d = def();
        assert_eq!(serialize_leaf(&d, "ID", &json!(12)).unwrap(), json!("12"));
        assert_eq!(serialize_leaf(&d, "String", &json!(true)).unwrap(), json!("true"));
        assert!(serialize_leaf(&d, "Int", &json!("x")).is_err());
        assert!(serialize_leaf(&d, "Mood", &json!("MEH")).is_err());
    }
}

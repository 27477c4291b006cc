//! Projection of the type IR into a JSON-Schema-shaped document.
//!
//! The projection is pure and deterministic: structurally identical input
//! yields byte-identical output, with `properties` insertion order matching
//! declaration order and union/intersection member order preserved. External
//! tooling (request validation, client generation) depends on these exact
//! shapes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{
    ArrayType, IntersectionType, Keyword, KeywordType, ObjectType, Property, ResolvedType,
    TupleType, Type, TypeElement, UnionType,
};

pub type JsonMap = Map<String, Value>;

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// The oracle reported a type it could not classify; nothing sensible
    /// can be projected for it. Aborts generation for the one affected
    /// method, not the whole compilation unit.
    #[error("type is not representable as a schema: {type_text}")]
    Unprojectable { type_text: String },
}

/// Convert a resolved type to a validation schema.
pub trait ToJsonSchema {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError>;
}

impl ToJsonSchema for Type {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        match self {
            Type::Resolved(t) => t.to_json_schema(),
            Type::Unresolved(text) => Err(SchemaError::Unprojectable {
                type_text: text.clone(),
            }),
        }
    }
}

impl ToJsonSchema for ResolvedType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        match self {
            ResolvedType::Keyword(n) => n.to_json_schema(),
            ResolvedType::Array(n) => n.to_json_schema(),
            ResolvedType::Tuple(n) => n.to_json_schema(),
            ResolvedType::Object(n) => n.to_json_schema(),
            ResolvedType::Intersection(n) => n.to_json_schema(),
            ResolvedType::Union(n) => n.to_json_schema(),
        }
    }
}

impl ToJsonSchema for KeywordType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        // null and undefined keep their own marker rather than being
        // dropped, so a union member list never loses arity.
        let s = match self.keyword {
            Keyword::String => "string",
            Keyword::Number => "number",
            Keyword::Boolean => "boolean",
            Keyword::Null => "null",
            Keyword::Undefined => "undefined",
        };

        let mut map = Map::default();
        map.insert("type".into(), Value::String(s.into()));
        Ok(map)
    }
}

impl ToJsonSchema for ArrayType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        let mut map = Map::default();
        map.insert("type".into(), Value::String("array".into()));
        map.insert("items".into(), Value::Object(self.elem.to_json_schema()?));
        Ok(map)
    }
}

impl ToJsonSchema for TupleType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        // Positional element types collapse into one oneOf item schema.
        // Lossy, but this is the shape downstream validators expect.
        let types = self
            .elems
            .iter()
            .map(|v| v.to_json_schema().map(Value::Object))
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = Map::default();
        map.insert("type".into(), Value::String("array".into()));
        map.insert("items".into(), {
            let mut items = Map::default();
            items.insert("oneOf".into(), Value::Array(types));
            Value::Object(items)
        });
        Ok(map)
    }
}

impl ToJsonSchema for ObjectType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        let mut properties = Map::default();
        let mut required = Vec::new();

        for m in self.members.iter() {
            match m {
                TypeElement::Property(p) => {
                    if !p.optional {
                        required.push(Value::String(p.name.clone()));
                    }
                    properties.insert(p.name.clone(), Value::Object(p.to_json_schema()?));
                }
            }
        }

        let mut map = Map::default();
        map.insert("type".into(), Value::String("object".into()));
        map.insert("properties".into(), Value::Object(properties));
        map.insert("required".into(), Value::Array(required));
        Ok(map)
    }
}

impl ToJsonSchema for IntersectionType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        let mut map = Map::default();
        map.insert(
            "allOf".into(),
            Value::Array(
                self.types
                    .iter()
                    .map(|v| v.to_json_schema().map(Value::Object))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        );
        Ok(map)
    }
}

impl ToJsonSchema for UnionType {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        let mut map = Map::default();
        map.insert(
            "oneOf".into(),
            Value::Array(
                self.types
                    .iter()
                    .map(|v| v.to_json_schema().map(Value::Object))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        );
        Ok(map)
    }
}

impl ToJsonSchema for Property {
    fn to_json_schema(&self) -> Result<JsonMap, SchemaError> {
        self.ty.to_json_schema()
    }
}

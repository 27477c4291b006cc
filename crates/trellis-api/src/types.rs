//! Structural type IR.
//!
//! The oracle reports the structural type of each method parameter and the
//! unwrapped return type in this form. The serde layout matches the oracle
//! wire format: internally tagged objects with a camelCase `kind` field.
//!
//! Member order is load-bearing everywhere a `Vec` appears: unions and
//! intersections keep the oracle's enumeration order and object members keep
//! declaration order, so schema projection stays reproducible. Values are
//! owned trees, so the IR is acyclic by construction; recursive named types
//! are rejected by the oracle before they ever reach us.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Type {
    Resolved(ResolvedType),
    /// Anything the oracle could not classify. Reported verbatim so the
    /// failure can be attributed; never silently coerced.
    Unresolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ResolvedType {
    Keyword(KeywordType),
    Array(ArrayType),
    Tuple(TupleType),
    Object(ObjectType),
    Intersection(IntersectionType),
    Union(UnionType),
}

impl From<ResolvedType> for Type {
    fn from(t: ResolvedType) -> Self {
        Type::Resolved(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keyword {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::String => "string",
            Keyword::Number => "number",
            Keyword::Boolean => "boolean",
            Keyword::Null => "null",
            Keyword::Undefined => "undefined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeywordType {
    pub keyword: Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArrayType {
    pub elem: Box<Type>,
}

/// Fixed arity, heterogeneous element types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TupleType {
    pub elems: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectType {
    pub members: Vec<TypeElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TypeElement {
    Property(Property),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Box<Type>,
    pub optional: bool,
}

/// At least two members; order is the oracle's enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UnionType {
    pub types: Vec<Box<Type>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntersectionType {
    pub types: Vec<Type>,
}

impl Type {
    pub fn keyword(k: Keyword) -> Type {
        ResolvedType::Keyword(KeywordType { keyword: k }).into()
    }

    pub fn array(elem: Type) -> Type {
        ResolvedType::Array(ArrayType {
            elem: Box::new(elem),
        })
        .into()
    }

    pub fn tuple(elems: Vec<Type>) -> Type {
        ResolvedType::Tuple(TupleType { elems }).into()
    }

    pub fn object(members: Vec<(&str, Type, bool)>) -> Type {
        ResolvedType::Object(ObjectType {
            members: members
                .into_iter()
                .map(|(name, ty, optional)| {
                    TypeElement::Property(Property {
                        name: name.to_string(),
                        ty: Box::new(ty),
                        optional,
                    })
                })
                .collect(),
        })
        .into()
    }

    pub fn union(types: Vec<Type>) -> Type {
        ResolvedType::Union(UnionType {
            types: types.into_iter().map(Box::new).collect(),
        })
        .into()
    }

    pub fn intersection(types: Vec<Type>) -> Type {
        ResolvedType::Intersection(IntersectionType { types }).into()
    }
}

//! Attestation data encoding for EAS schemas.
//!
//! An EAS schema string is a comma separated list of `<type> <name>` pairs,
//! e.g. `uint8 Hours, uint32 NFCID`. Attestation payloads are the plain ABI
//! encoding of the values as a tuple in schema order.

use std::fmt;

use ethers::abi::{self, param_type::Reader, ParamType, Token};
use ethers::types::Bytes;

use crate::error::{Error, Result};

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub kind: ParamType,
}

/// A value to encode, tagged with the field it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaItem {
    pub name: String,
    pub kind: ParamType,
    pub value: Token,
}

impl SchemaItem {
    pub fn new(name: impl Into<String>, kind: ParamType, value: Token) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaEncoder {
    fields: Vec<SchemaField>,
}

impl SchemaEncoder {
    pub fn new(schema: &str) -> Result<Self> {
        let mut fields: Vec<SchemaField> = Vec::new();
        for part in schema.split(',') {
            let part = part.trim();
            let mut words = part.split_whitespace();
            let (Some(ty), Some(name), None) = (words.next(), words.next(), words.next()) else {
                return Err(Error::Schema(format!(
                    "expected `<type> <name>`, found {part:?}"
                )));
            };
            let kind = Reader::read(ty)
                .map_err(|e| Error::Schema(format!("unsupported type {ty:?}: {e}")))?;
            check_width(ty, &kind)?;
            if fields.iter().any(|f| f.name == name) {
                return Err(Error::Schema(format!("duplicate field {name:?}")));
            }
            fields.push(SchemaField {
                name: name.to_string(),
                kind,
            });
        }
        Ok(Self { fields })
    }

    /// ABI-encode `items`, which must follow the schema field by field.
    pub fn encode_data(&self, items: &[SchemaItem]) -> Result<Bytes> {
        if items.len() != self.fields.len() {
            return Err(Error::Encoding(format!(
                "schema has {} fields, got {} values",
                self.fields.len(),
                items.len()
            )));
        }

        let mut tokens = Vec::with_capacity(items.len());
        for (field, item) in self.fields.iter().zip(items) {
            if field.name != item.name || field.kind != item.kind {
                return Err(Error::Encoding(format!(
                    "expected {} {}, got {} {}",
                    field.kind, field.name, item.kind, item.name
                )));
            }
            check_value(field, &item.value)?;
            tokens.push(item.value.clone());
        }

        Ok(abi::encode(&tokens).into())
    }

    pub fn decode_data(&self, data: &[u8]) -> Result<Vec<SchemaItem>> {
        let kinds: Vec<ParamType> = self.fields.iter().map(|f| f.kind.clone()).collect();
        let tokens = abi::decode(&kinds, data).map_err(|e| Error::Encoding(e.to_string()))?;
        Ok(self
            .fields
            .iter()
            .zip(tokens)
            .map(|(field, value)| SchemaItem::new(field.name.clone(), field.kind.clone(), value))
            .collect())
    }
}

impl fmt::Display for SchemaEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.kind, field.name)?;
        }
        Ok(())
    }
}

fn check_width(ty: &str, kind: &ParamType) -> Result<()> {
    let ok = match kind {
        ParamType::Uint(bits) | ParamType::Int(bits) => *bits > 0 && *bits <= 256 && bits % 8 == 0,
        ParamType::FixedBytes(len) => *len > 0 && *len <= 32,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Schema(format!("unsupported type {ty:?}")))
    }
}

fn check_value(field: &SchemaField, value: &Token) -> Result<()> {
    if !value.type_check(&field.kind) {
        return Err(Error::Encoding(format!(
            "value {value:?} does not match {} {}",
            field.kind, field.name
        )));
    }
    if let (ParamType::Uint(bits), Token::Uint(v)) = (&field.kind, value) {
        if v.bits() > *bits {
            return Err(Error::Encoding(format!(
                "{} does not fit in {} for {}",
                v, field.kind, field.name
            )));
        }
    }
    Ok(())
}

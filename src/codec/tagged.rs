//! Encoding between [`Value`] and the wire [`TaggedValue`].
//!
//! A list whose elements all share one scalar kind (int, float, bytes,
//! string) is packed into the matching typed list. Anything else, including
//! the empty list, goes out as a `ValueList` of individually encoded
//! elements. Decoding is the inverse, so `decode(&encode(v)) == v` for every
//! value; the converse holds only after that normalization.

use std::collections::{BTreeMap, HashMap};

use crate::rpc::proto::tagged_value::Kind;
use crate::rpc::proto::{
    BytesList, FloatList, Int64Dict, Int64List, StringList, Struct, TaggedValue, ValueList,
};

use super::{CodecError, Value};

/// Encode a value into its wire form.
pub fn encode(value: &Value) -> TaggedValue {
    let kind = match value {
        Value::Null => return TaggedValue::default(),
        Value::Int(i) => Kind::Int64(*i),
        Value::Float(f) => Kind::Float64(*f),
        Value::Bytes(b) => Kind::Bytes(b.clone()),
        Value::String(s) => Kind::String(s.clone()),
        Value::Bool(b) => Kind::Bool(*b),
        Value::List(items) => encode_list(items),
        Value::Map(map) => Kind::Struct(Struct {
            fields: map.iter().map(|(k, v)| (k.clone(), encode(v))).collect(),
        }),
        Value::IntMap(map) => Kind::Int64Dict(Int64Dict {
            fields: map.iter().map(|(k, v)| (*k, encode(v))).collect(),
        }),
    };
    TaggedValue::new(kind)
}

fn encode_list(items: &[Value]) -> Kind {
    if items.is_empty() {
        return Kind::ValueList(ValueList::default());
    }
    if let Some(values) = homogeneous(items, |v| match v {
        Value::Int(i) => Some(*i),
        _ => None,
    }) {
        return Kind::Int64List(Int64List { values });
    }
    if let Some(values) = homogeneous(items, |v| match v {
        Value::Float(f) => Some(*f),
        _ => None,
    }) {
        return Kind::Float64List(FloatList { values });
    }
    if let Some(values) = homogeneous(items, |v| match v {
        Value::Bytes(b) => Some(b.clone()),
        _ => None,
    }) {
        return Kind::BytesList(BytesList { values });
    }
    if let Some(values) = homogeneous(items, |v| match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }) {
        return Kind::StringList(StringList { values });
    }
    Kind::ValueList(ValueList {
        values: items.iter().map(encode).collect(),
    })
}

fn homogeneous<T>(items: &[Value], pick: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    items.iter().map(pick).collect()
}

/// Decode a wire value.
///
/// Fails with [`CodecError::UnknownTaggedKind`] if this value, or any value
/// nested in it, populated a field number outside the known kinds.
pub fn decode(tagged: &TaggedValue) -> Result<Value, CodecError> {
    if let Some(tag) = tagged.unknown_kind {
        return Err(CodecError::UnknownTaggedKind(tag));
    }
    let Some(kind) = &tagged.kind else {
        return Ok(Value::Null);
    };
    Ok(match kind {
        Kind::Int64(i) => Value::Int(*i),
        Kind::Float64(f) => Value::Float(*f),
        Kind::Bytes(b) => Value::Bytes(b.clone()),
        Kind::String(s) => Value::String(s.clone()),
        Kind::Bool(b) => Value::Bool(*b),
        Kind::Int64List(list) => Value::List(list.values.iter().copied().map(Value::Int).collect()),
        Kind::Float64List(list) => {
            Value::List(list.values.iter().copied().map(Value::Float).collect())
        }
        Kind::BytesList(list) => {
            Value::List(list.values.iter().cloned().map(Value::Bytes).collect())
        }
        Kind::StringList(list) => {
            Value::List(list.values.iter().cloned().map(Value::String).collect())
        }
        Kind::ValueList(list) => Value::List(
            list.values
                .iter()
                .map(decode)
                .collect::<Result<_, _>>()?,
        ),
        Kind::Struct(s) => Value::Map(
            s.fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), decode(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
        Kind::Int64Dict(d) => Value::IntMap(
            d.fields
                .iter()
                .map(|(k, v)| Ok((*k, decode(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

/// Encode a named field mapping, as carried by request `inputs`.
pub fn encode_fields(fields: &BTreeMap<String, Value>) -> HashMap<String, TaggedValue> {
    fields.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decode a named field mapping, as carried by response `outputs`.
pub fn decode_fields(
    fields: &HashMap<String, TaggedValue>,
) -> Result<BTreeMap<String, Value>, CodecError> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_scalars_round_trip() {
        round_trip(Value::Null);
        round_trip(Value::Int(-7));
        round_trip(Value::Float(0.25));
        round_trip(Value::Bytes(vec![0, 159, 146, 150]));
        round_trip(Value::from("héllo"));
        round_trip(Value::Bool(false));
    }

    #[test]
    fn test_homogeneous_lists_pick_typed_variant() {
        let ints = encode(&Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(ints.kind, Some(Kind::Int64List(_))));

        let floats = encode(&Value::List(vec![Value::Float(1.0), Value::Float(2.5)]));
        assert!(matches!(floats.kind, Some(Kind::Float64List(_))));

        let bytes = encode(&Value::List(vec![Value::Bytes(b"a".to_vec())]));
        assert!(matches!(bytes.kind, Some(Kind::BytesList(_))));

        let strings = encode(&Value::List(vec![Value::from("a"), Value::from("b")]));
        assert!(matches!(strings.kind, Some(Kind::StringList(_))));
    }

    #[test]
    fn test_mixed_list_falls_back_to_value_list() {
        let mixed = Value::List(vec![Value::Int(1), Value::from("a")]);
        let tagged = encode(&mixed);
        match &tagged.kind {
            Some(Kind::ValueList(list)) => {
                assert_eq!(list.values.len(), 2);
                assert_eq!(list.values[0].kind, Some(Kind::Int64(1)));
                assert_eq!(list.values[1].kind, Some(Kind::String("a".into())));
            }
            other => panic!("expected value list, got {other:?}"),
        }
        assert_eq!(decode(&tagged).unwrap(), mixed);
    }

    #[test]
    fn test_int_and_float_do_not_mix_into_typed_list() {
        let tagged = encode(&Value::List(vec![Value::Int(1), Value::Float(2.0)]));
        assert!(matches!(tagged.kind, Some(Kind::ValueList(_))));
    }

    #[test]
    fn test_bool_list_is_value_list() {
        let value = Value::List(vec![Value::Bool(true), Value::Bool(false)]);
        assert!(matches!(encode(&value).kind, Some(Kind::ValueList(_))));
        round_trip(value);
    }

    #[test]
    fn test_empty_collections() {
        assert!(matches!(
            encode(&Value::List(vec![])).kind,
            Some(Kind::ValueList(_))
        ));
        assert!(matches!(
            encode(&Value::Map(BTreeMap::new())).kind,
            Some(Kind::Struct(_))
        ));
        round_trip(Value::List(vec![]));
        round_trip(Value::Map(BTreeMap::new()));
        round_trip(Value::IntMap(BTreeMap::new()));
    }

    #[test]
    fn test_maps_round_trip() {
        round_trip(Value::string_map([
            ("role", Value::from("user")),
            (
                "content",
                Value::List(vec![Value::string_map([("type", Value::from("text"))])]),
            ),
        ]));

        let int_keyed = Value::int_map([(50256, Value::Float(-100.0)), (-1, Value::Null)]);
        assert!(matches!(encode(&int_keyed).kind, Some(Kind::Int64Dict(_))));
        round_trip(int_keyed);
    }

    #[test]
    fn test_nested_unknown_kind_fails() {
        let inner = TaggedValue {
            kind: None,
            unknown_kind: Some(99),
        };
        let outer = TaggedValue::new(Kind::ValueList(ValueList {
            values: vec![TaggedValue::new(Kind::Int64(1)), inner],
        }));
        assert_eq!(decode(&outer), Err(CodecError::UnknownTaggedKind(99)));
    }

    #[test]
    fn test_unset_kind_decodes_to_null() {
        assert_eq!(decode(&TaggedValue::default()).unwrap(), Value::Null);
    }
}

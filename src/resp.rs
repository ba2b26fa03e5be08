use bytes::Bytes;

/// Decoded RESP reply as handed over by a node client.
///
/// This is the reply shape only; framing and parsing of the wire protocol
/// belong to the single-node client behind [`crate::node::NodeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Value>),
}

impl Value {
    pub fn simple<T: AsRef<[u8]>>(value: T) -> Self {
        Value::Simple(Bytes::copy_from_slice(value.as_ref()))
    }

    pub fn bulk<T: AsRef<[u8]>>(value: T) -> Self {
        Value::Bulk(Bytes::copy_from_slice(value.as_ref()))
    }

    pub fn ok() -> Self {
        Value::Simple(Bytes::from_static(b"OK"))
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Bulk(data) | Value::Simple(data) => {
                std::str::from_utf8(data).ok()?.parse().ok()
            }
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bulk(data) | Value::Simple(data) => Some(data),
            _ => None,
        }
    }
}

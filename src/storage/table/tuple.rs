use std::fmt;
use serde::{Deserialize, Serialize};

/// A single column value.
///
/// All variants are totally ordered and hashable so projected values can
/// serve directly as index keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Text(String),
    Boolean(bool),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Null => write!(f, "NULL"),
        }
    }
}

/// One row of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Project the attributes at `key_attrs`, in order. Missing positions
    /// project as `Null`.
    pub fn project(&self, key_attrs: &[usize]) -> Vec<Value> {
        key_attrs
            .iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let tuple = Tuple::new(vec![
            Value::Integer(42),
            Value::Text("basalt".to_string()),
            Value::Boolean(true),
            Value::Null,
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }

    #[test]
    fn test_project() {
        let tuple = Tuple::new(vec![Value::Integer(1), Value::Text("a".to_string())]);
        assert_eq!(
            tuple.project(&[1, 0]),
            vec![Value::Text("a".to_string()), Value::Integer(1)]
        );
        assert_eq!(tuple.project(&[5]), vec![Value::Null]);
    }
}

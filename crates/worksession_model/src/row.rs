//! Raw query rows.

use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// A single row returned by a raw query, with columns in result order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, builder-style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a column.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Returns a column value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Returns all columns in order.
    #[must_use]
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Reads a required integer column.
    pub fn get_i64(&self, name: &str) -> ModelResult<i64> {
        match self.get(name) {
            Some(Value::Integer(n)) => Ok(*n),
            Some(other) => Err(ModelError::type_mismatch(name, "integer", other.kind())),
            None => Err(ModelError::missing_column(name)),
        }
    }

    /// Reads a required text column.
    pub fn get_text(&self, name: &str) -> ModelResult<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Ok(s.as_str()),
            Some(other) => Err(ModelError::type_mismatch(name, "text", other.kind())),
            None => Err(ModelError::missing_column(name)),
        }
    }
}

/// Conversion from a raw row into a typed projection.
pub trait FromRow: Sized {
    /// Builds a value from one row.
    fn from_row(row: &Row) -> ModelResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> ModelResult<Self> {
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Total {
        customer: String,
        amount: i64,
    }

    impl FromRow for Total {
        fn from_row(row: &Row) -> ModelResult<Self> {
            Ok(Self {
                customer: row.get_text("customer")?.to_string(),
                amount: row.get_i64("amount")?,
            })
        }
    }

    #[test]
    fn typed_projection() {
        let row = Row::new().with("customer", "acme").with("amount", 12);
        let total = Total::from_row(&row).unwrap();
        assert_eq!(total.customer, "acme");
        assert_eq!(total.amount, 12);
    }

    #[test]
    fn projection_errors() {
        let row = Row::new().with("customer", 1);
        assert!(matches!(
            Total::from_row(&row),
            Err(ModelError::TypeMismatch { .. })
        ));
        let row = Row::new().with("customer", "acme");
        assert_eq!(
            Total::from_row(&row).err(),
            Some(ModelError::missing_column("amount"))
        );
    }
}

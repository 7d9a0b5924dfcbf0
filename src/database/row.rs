//! Result rows and the row cursor handed to read callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use super::Value;

/// Column names for a result set, shared by every row of that result set.
///
/// Name lookup is case-insensitive, as SQL identifiers usually are.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // First occurrence wins for duplicate names (`SELECT a.id, b.id`).
            index.entry(name.to_ascii_lowercase()).or_insert(i);
        }
        Self { names, index }
    }

    /// Returns the position of `name` (case-insensitive), or `None`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<Columns>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value at column position `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the column called `name` (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the row as a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .names()
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// Forward-only cursor over the rows produced by a read statement.
///
/// This is what a read callback receives. It yields owned [`Row`]s in the
/// order the backend returned them.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sqlcourier::{Columns, Row, RowCursor, Value};
///
/// let columns = Arc::new(Columns::new(vec!["id".into()]));
/// let rows = vec![Row::new(Arc::clone(&columns), vec![Value::Integer(1)])];
/// let mut cursor = RowCursor::new(columns, rows);
///
/// assert_eq!(cursor.len(), 1);
/// let row = cursor.next().unwrap();
/// assert_eq!(row.get_by_name("ID"), Some(&Value::Integer(1)));
/// assert!(cursor.next().is_none());
/// ```
#[derive(Debug)]
pub struct RowCursor {
    columns: Arc<Columns>,
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor {
    pub fn new(columns: Arc<Columns>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    /// A cursor with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(Arc::new(Columns::default()), Vec::new())
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for RowCursor {}

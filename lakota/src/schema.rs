//! Schemas, column kinds and index values.
//!
//! A schema is an ordered sequence of typed columns. Columns flagged as
//! part of the index together form the sort key of a series; at least one
//! index column is required and index columns come before the others in
//! stored segments. A schema never changes after the collection is
//! created, which is what lets the codec stay implicit: (schema, column
//! position) fully determines how a column blob is encoded.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Resolution of a timestamp column, nanoseconds to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Milli,
    Micro,
    Nano,
}

/// Logical column types.
///
/// Timestamps and dates are stored as 64-bit integers (ticks of the unit,
/// days since epoch); the kind only drives casting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Int64,
    Float64,
    Bool,
    Timestamp(TimeUnit),
    Date,
    Str,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    /// Whether this column is part of the sort key.
    pub index: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind, index: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            index,
        }
    }
}

/// Ordered, validated column set. Index columns first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Builds a schema, validating name uniqueness and the presence of at
    /// least one index column. Index columns are moved in front of the
    /// others, preserving relative order.
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::SchemaMismatch("schema has no columns".into()));
        }
        for (i, col) in columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(Error::SchemaMismatch("empty column name".into()));
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::SchemaMismatch(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }
        if !columns.iter().any(|c| c.index) {
            return Err(Error::SchemaMismatch("no index column defined".into()));
        }
        let (idx, rest): (Vec<_>, Vec<_>) = columns.into_iter().partition(|c| c.index);
        let mut columns = idx;
        columns.extend(rest);
        Ok(Self { columns })
    }

    /// The fixed schema of collection and repo registries:
    /// `label` (index) → `digest` (identity), `meta` (opaque payload).
    pub fn registry() -> Self {
        Schema {
            columns: vec![
                ColumnDef::new("label", ColumnKind::Str, true),
                ColumnDef::new("digest", ColumnKind::Bytes, false),
                ColumnDef::new("meta", ColumnKind::Bytes, false),
            ],
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of index columns (they occupy positions `0..idx_len`).
    pub fn idx_len(&self) -> usize {
        self.columns.iter().filter(|c| c.index).count()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Schema restricted to the index columns plus the named non-index
    /// columns, in schema order.
    pub fn project(&self, names: &[String]) -> Result<Schema> {
        for name in names {
            if self.position(name).is_none() {
                return Err(Error::SchemaMismatch(format!("unknown column: {name}")));
            }
        }
        let columns = self
            .columns
            .iter()
            .filter(|c| c.index || names.iter().any(|n| n == &c.name))
            .cloned()
            .collect();
        Ok(Schema { columns })
    }

    pub fn dumps(&self) -> String {
        serde_json::to_string(self).expect("schema serialization is infallible")
    }

    pub fn loads(data: &str) -> Result<Schema> {
        let schema: Schema =
            serde_json::from_str(data).map_err(|e| Error::corrupt(format!("bad schema: {e}")))?;
        if schema.columns.is_empty() || schema.idx_len() == 0 {
            return Err(Error::corrupt("bad schema: no index column"));
        }
        Ok(schema)
    }
}

/// A single cell of an index tuple.
///
/// `Min` and `Max` are internal padding sentinels for range arithmetic
/// (they sort below and above every real value) and never appear in stored
/// data.
#[derive(Debug, Clone)]
pub enum Value {
    Min,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    Max,
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Min => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Bool(_) => 3,
            Value::Str(_) => 4,
            Value::Bytes(_) => 5,
            Value::Max => 6,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// An index tuple: one [`Value`] per index column. May be a prefix of the
/// full index width in query bounds. Ordering is lexicographic with the
/// shorter tuple first on ties, matching how rows sort.
pub type IndexKey = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(vec![
            ColumnDef::new("value", ColumnKind::Float64, false),
            ColumnDef::new("timestamp", ColumnKind::Timestamp(TimeUnit::Second), true),
        ])
        .unwrap()
    }

    #[test]
    fn should_move_index_columns_first() {
        // given/when
        let schema = sample();

        // then
        assert_eq!(schema.columns()[0].name, "timestamp");
        assert_eq!(schema.columns()[1].name, "value");
        assert_eq!(schema.idx_len(), 1);
    }

    #[test]
    fn should_reject_schema_without_index() {
        let result = Schema::new(vec![ColumnDef::new("v", ColumnKind::Int64, false)]);
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_duplicate_column_names() {
        let result = Schema::new(vec![
            ColumnDef::new("a", ColumnKind::Int64, true),
            ColumnDef::new("a", ColumnKind::Float64, false),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn should_roundtrip_json_dump() {
        // given
        let schema = sample();

        // when
        let dump = schema.dumps();
        let back = Schema::loads(&dump).unwrap();

        // then
        assert_eq!(back, schema);
    }

    #[test]
    fn should_project_index_plus_selected_columns() {
        // given
        let schema = Schema::new(vec![
            ColumnDef::new("ts", ColumnKind::Int64, true),
            ColumnDef::new("a", ColumnKind::Float64, false),
            ColumnDef::new("b", ColumnKind::Float64, false),
        ])
        .unwrap();

        // when
        let projected = schema.project(&["b".to_string()]).unwrap();

        // then
        let names: Vec<_> = projected.columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["ts", "b"]);
    }

    #[test]
    fn should_reject_projection_of_unknown_column() {
        let schema = sample();
        assert!(schema.project(&["nope".to_string()]).is_err());
    }

    #[test]
    fn should_order_values_with_sentinels_at_extremes() {
        // given
        let low = Value::Min;
        let mid = Value::Int(0);
        let high = Value::Max;

        // then
        assert!(low < mid);
        assert!(mid < high);
        assert!(Value::Int(i64::MIN) > Value::Min);
        assert!(Value::Str(String::new()) < Value::Max);
    }

    #[test]
    fn should_order_index_keys_like_tuples() {
        // given - a shorter key sorts before its extensions
        let short: IndexKey = vec![Value::Str("a".into())];
        let long: IndexKey = vec![Value::Str("a".into()), Value::Int(1)];

        // then
        assert!(short < long);
    }

    #[test]
    fn should_order_floats_totally() {
        assert!(Value::Float(f64::NEG_INFINITY) < Value::Float(0.0));
        assert!(Value::Float(0.0) < Value::Float(f64::INFINITY));
        assert_eq!(Value::Float(1.5), Value::Float(1.5));
    }
}

//! Frames: in-memory columnar batches.
//!
//! A frame is one typed array per schema column, all of equal length,
//! sorted lexicographically by the index columns with no duplicate index
//! tuples. Construction enforces the invariant (sort, then deduplicate
//! keeping the last occurrence); frames are immutable afterwards.

use std::ops::Bound;

use crate::error::{Error, Result};
use crate::schema::{ColumnKind, IndexKey, Schema, Value};

/// A typed column of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl Array {
    pub fn len(&self) -> usize {
        match self {
            Array::Int64(v) => v.len(),
            Array::Float64(v) => v.len(),
            Array::Bool(v) => v.len(),
            Array::Str(v) => v.len(),
            Array::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, i: usize) -> Value {
        match self {
            Array::Int64(v) => Value::Int(v[i]),
            Array::Float64(v) => Value::Float(v[i]),
            Array::Bool(v) => Value::Bool(v[i]),
            Array::Str(v) => Value::Str(v[i].clone()),
            Array::Bytes(v) => Value::Bytes(v[i].clone()),
        }
    }

    /// Empty array of the variant that backs `kind`.
    pub fn empty(kind: ColumnKind) -> Array {
        match kind {
            ColumnKind::Int64 | ColumnKind::Timestamp(_) | ColumnKind::Date => {
                Array::Int64(Vec::new())
            }
            ColumnKind::Float64 => Array::Float64(Vec::new()),
            ColumnKind::Bool => Array::Bool(Vec::new()),
            ColumnKind::Str => Array::Str(Vec::new()),
            ColumnKind::Bytes => Array::Bytes(Vec::new()),
        }
    }

    /// Whether this array variant can back a column of `kind`.
    pub fn matches(&self, kind: ColumnKind) -> bool {
        matches!(
            (self, kind),
            (
                Array::Int64(_),
                ColumnKind::Int64 | ColumnKind::Timestamp(_) | ColumnKind::Date
            ) | (Array::Float64(_), ColumnKind::Float64)
                | (Array::Bool(_), ColumnKind::Bool)
                | (Array::Str(_), ColumnKind::Str)
                | (Array::Bytes(_), ColumnKind::Bytes)
        )
    }

    /// New array holding `positions`-selected values, in order.
    fn take(&self, positions: &[usize]) -> Array {
        match self {
            Array::Int64(v) => Array::Int64(positions.iter().map(|&i| v[i]).collect()),
            Array::Float64(v) => Array::Float64(positions.iter().map(|&i| v[i]).collect()),
            Array::Bool(v) => Array::Bool(positions.iter().map(|&i| v[i]).collect()),
            Array::Str(v) => Array::Str(positions.iter().map(|&i| v[i].clone()).collect()),
            Array::Bytes(v) => Array::Bytes(positions.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    pub(crate) fn slice(&self, start: usize, stop: usize) -> Array {
        match self {
            Array::Int64(v) => Array::Int64(v[start..stop].to_vec()),
            Array::Float64(v) => Array::Float64(v[start..stop].to_vec()),
            Array::Bool(v) => Array::Bool(v[start..stop].to_vec()),
            Array::Str(v) => Array::Str(v[start..stop].to_vec()),
            Array::Bytes(v) => Array::Bytes(v[start..stop].to_vec()),
        }
    }

    fn concat(parts: Vec<Array>) -> Array {
        let mut iter = parts.into_iter();
        let mut head = iter.next().expect("concat of at least one array");
        for part in iter {
            match (&mut head, part) {
                (Array::Int64(a), Array::Int64(b)) => a.extend(b),
                (Array::Float64(a), Array::Float64(b)) => a.extend(b),
                (Array::Bool(a), Array::Bool(b)) => a.extend(b),
                (Array::Str(a), Array::Str(b)) => a.extend(b),
                (Array::Bytes(a), Array::Bytes(b)) => a.extend(b),
                _ => unreachable!("mismatched array variants in concat"),
            }
        }
        head
    }
}

/// Sorted, deduplicated columnar batch conforming to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    schema: Schema,
    columns: Vec<Array>,
}

impl Frame {
    /// Builds a frame from raw arrays (one per schema column, schema
    /// order). Rows are sorted by the index columns and deduplicated,
    /// keeping the last occurrence of each index tuple.
    pub fn new(schema: Schema, columns: Vec<Array>) -> Result<Frame> {
        if columns.len() != schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }
        let mut length = None;
        for (col, def) in columns.iter().zip(schema.columns()) {
            if !col.matches(def.kind) {
                return Err(Error::SchemaMismatch(format!(
                    "column {} does not match kind {:?}",
                    def.name, def.kind
                )));
            }
            match length {
                None => length = Some(col.len()),
                Some(len) if len != col.len() => {
                    return Err(Error::SchemaMismatch("column length mismatch".into()))
                }
                _ => {}
            }
        }
        let frame = Frame { schema, columns };
        Ok(frame.sorted_deduped())
    }

    /// Builds a frame from arrays already sorted and deduplicated, e.g.
    /// slices of an existing frame.
    pub(crate) fn from_sorted(schema: Schema, columns: Vec<Array>) -> Frame {
        Frame { schema, columns }
    }

    pub fn empty(schema: Schema) -> Frame {
        let columns = schema
            .columns()
            .iter()
            .map(|c| Array::empty(c.kind))
            .collect();
        Frame { schema, columns }
    }

    fn sorted_deduped(self) -> Frame {
        let len = self.len();
        if len < 2 {
            return self;
        }
        let keys: Vec<IndexKey> = (0..len).map(|i| self.row_key(i)).collect();
        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        // Dedup: within a run of equal keys the latest input row wins.
        let mut keep: Vec<usize> = Vec::with_capacity(len);
        let mut run_best = order[0];
        for &pos in &order[1..] {
            if keys[pos] == keys[run_best] {
                run_best = run_best.max(pos);
            } else {
                keep.push(run_best);
                run_best = pos;
            }
        }
        keep.push(run_best);
        let columns = self.columns.iter().map(|c| c.take(&keep)).collect();
        Frame {
            schema: self.schema,
            columns,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.columns.first().map(Array::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn array(&self, pos: usize) -> &Array {
        &self.columns[pos]
    }

    pub fn column(&self, name: &str) -> Option<&Array> {
        self.schema.position(name).map(|i| &self.columns[i])
    }

    /// Index tuple of row `i`.
    pub fn row_key(&self, i: usize) -> IndexKey {
        (0..self.schema.idx_len())
            .map(|c| self.columns[c].value(i))
            .collect()
    }

    /// First index tuple, `None` when empty.
    pub fn start_key(&self) -> Option<IndexKey> {
        (!self.is_empty()).then(|| self.row_key(0))
    }

    /// Last index tuple, `None` when empty.
    pub fn stop_key(&self) -> Option<IndexKey> {
        (!self.is_empty()).then(|| self.row_key(self.len() - 1))
    }

    /// Sub-frame over row positions `start..stop`.
    pub fn slice(&self, start: usize, stop: usize) -> Frame {
        let columns = self.columns.iter().map(|c| c.slice(start, stop)).collect();
        Frame {
            schema: self.schema.clone(),
            columns,
        }
    }

    /// Concatenates frames that are already in global index order with
    /// disjoint key ranges.
    pub(crate) fn concat(schema: Schema, frames: Vec<Frame>) -> Frame {
        if frames.is_empty() {
            return Frame::empty(schema);
        }
        let width = schema.len();
        let columns = (0..width)
            .map(|i| Array::concat(frames.iter().map(|f| f.columns[i].clone()).collect()))
            .collect();
        Frame { schema, columns }
    }

    fn partition(&self, pred: impl Fn(usize) -> bool) -> usize {
        let (mut lo, mut hi) = (0usize, self.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if pred(mid) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First row position admitted by the lower bound.
    pub fn lower_bound(&self, bound: &Bound<IndexKey>) -> usize {
        match bound {
            Bound::Unbounded => 0,
            Bound::Included(key) => self.partition(|i| self.row_key(i) < *key),
            Bound::Excluded(key) => self.partition(|i| self.row_key(i) <= *key),
        }
    }

    /// One past the last row position admitted by the upper bound.
    pub fn upper_bound(&self, bound: &Bound<IndexKey>) -> usize {
        match bound {
            Bound::Unbounded => self.len(),
            Bound::Included(key) => self.partition(|i| self.row_key(i) <= *key),
            Bound::Excluded(key) => self.partition(|i| self.row_key(i) < *key),
        }
    }

    /// Sub-frame of the rows admitted by both bounds.
    pub fn between(&self, lo: &Bound<IndexKey>, hi: &Bound<IndexKey>) -> Frame {
        let start = self.lower_bound(lo);
        let stop = self.upper_bound(hi).max(start);
        self.slice(start, stop)
    }
}

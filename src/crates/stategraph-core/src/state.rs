//! Typed state schema with per-field merge strategies
//!
//! A graph's state is a JSON object whose fields are declared up front. Each field carries
//! a [`MergeStrategy`] that decides how a node's partial update combines with the current
//! value:
//!
//! | Strategy | Behavior | Typical field |
//! |----------|----------|---------------|
//! | [`MergeStrategy::Replace`] | update overwrites the value | `status`, `counter` |
//! | [`MergeStrategy::Append`] | update is appended (arrays extend, scalars push) | `messages` |
//! | [`MergeStrategy::Reducer`] | custom [`Reducer`] combines current and update | running sums |
//!
//! ```rust
//! use stategraph_core::state::{FieldSpec, StateSchema, SumReducer};
//! use serde_json::json;
//!
//! let schema = StateSchema::new()
//!     .field(FieldSpec::replace("status"))
//!     .field(FieldSpec::append("messages"))
//!     .field(FieldSpec::reducer("total", SumReducer).with_default(json!(0)));
//!
//! let mut state = schema.initial_state(None).unwrap();
//! schema.apply(&mut state, &json!({"messages": "hi", "total": 2})).unwrap();
//! schema.apply(&mut state, &json!({"messages": "there", "total": 3})).unwrap();
//!
//! assert_eq!(state["messages"], json!(["hi", "there"]));
//! assert_eq!(state["total"], json!(5));
//! ```
//!
//! The strategy of every field is fingerprinted into each checkpoint. Loading a checkpoint
//! whose fingerprint disagrees with the current declarations, or whose snapshot carries a
//! field that is no longer declared, is a schema mismatch: callers migrate explicitly
//! instead of having values silently dropped or coerced. Newly declared fields are filled
//! with their default.

use serde_json::Value;
use stategraph_checkpoint::StateValues;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while applying state updates
#[derive(Debug, Error)]
pub enum StateError {
    /// State or update has the wrong shape
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Update names a field the schema does not declare
    #[error("Field '{0}' is not declared in the state schema")]
    UnknownField(String),

    /// Reducer rejected the update
    #[error("Reducer error: {0}")]
    ReducerError(String),

    /// Stored snapshot is incompatible with the declarations
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Combines the current value of a field with an update
pub trait Reducer: Send + Sync {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Stable name, recorded in checkpoints to detect changed merge semantics
    fn name(&self) -> &str;
}

/// Last write wins
#[derive(Debug, Clone)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Arrays extend, single values are pushed
#[derive(Debug, Clone)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr_arr), Value::Array(upd_arr)) => {
                let mut result = curr_arr.clone();
                result.extend_from_slice(upd_arr);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd_arr)) => Ok(Value::Array(upd_arr.clone())),
            (Value::Array(curr_arr), single_value) => {
                let mut result = curr_arr.clone();
                result.push(single_value.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single_value) => Ok(Value::Array(vec![single_value.clone()])),
            _ => Err(StateError::ReducerError(
                "AppendReducer requires array values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Shallow object merge
#[derive(Debug, Clone)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Object(curr_obj), Value::Object(upd_obj)) => {
                let mut result = curr_obj.clone();
                for (key, value) in upd_obj {
                    result.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(result))
            }
            (Value::Null, Value::Object(upd_obj)) => Ok(Value::Object(upd_obj.clone())),
            _ => Err(StateError::ReducerError(
                "MergeReducer requires object values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Numeric accumulation
#[derive(Debug, Clone)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a_i64), Some(b_i64)) = (a.as_i64(), b.as_i64()) {
                    a_i64
                        .checked_add(b_i64)
                        .map(|sum| Value::Number(sum.into()))
                        .ok_or_else(|| {
                            StateError::ReducerError(format!("{} + {} overflows i64", a_i64, b_i64))
                        })
                } else if let (Some(a_f64), Some(b_f64)) = (a.as_f64(), b.as_f64()) {
                    serde_json::Number::from_f64(a_f64 + b_f64)
                        .map(Value::Number)
                        .ok_or_else(|| StateError::ReducerError("Sum is not finite".to_string()))
                } else {
                    Err(StateError::ReducerError(
                        "Cannot add non-numeric values".to_string(),
                    ))
                }
            }
            (Value::Null, Value::Number(_)) => Ok(update.clone()),
            _ => Err(StateError::ReducerError(
                "SumReducer requires numeric values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// How updates to a field combine with its current value
#[derive(Clone)]
pub enum MergeStrategy {
    Replace,
    Append,
    Reducer(Arc<dyn Reducer>),
}

impl MergeStrategy {
    /// Stable identifier stored in checkpoints
    pub fn fingerprint(&self) -> String {
        match self {
            MergeStrategy::Replace => "replace".to_string(),
            MergeStrategy::Append => "append".to_string(),
            MergeStrategy::Reducer(reducer) => format!("reducer:{}", reducer.name()),
        }
    }

    pub fn merge(&self, current: &Value, update: &Value) -> Result<Value> {
        match self {
            MergeStrategy::Replace => OverwriteReducer.reduce(current, update),
            MergeStrategy::Append => AppendReducer.reduce(current, update),
            MergeStrategy::Reducer(reducer) => reducer.reduce(current, update),
        }
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Declaration of one state field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub strategy: MergeStrategy,
    pub default: Value,
}

impl FieldSpec {
    /// A last-write-wins field, default `null`
    pub fn replace(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: MergeStrategy::Replace,
            default: Value::Null,
        }
    }

    /// An accumulating list field, default `[]`
    pub fn append(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: MergeStrategy::Append,
            default: Value::Array(Vec::new()),
        }
    }

    /// A field merged by a custom reducer, default `null`
    pub fn reducer(name: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        Self {
            name: name.into(),
            strategy: MergeStrategy::Reducer(Arc::new(reducer)),
            default: Value::Null,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

/// Ordered set of field declarations
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_field`](Self::add_field)
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.add_field(spec);
        self
    }

    /// Declare a field, replacing an earlier declaration with the same name
    pub fn add_field(&mut self, spec: FieldSpec) {
        match self.index.get(&spec.name) {
            Some(&position) => self.fields[position] = spec,
            None => {
                self.index.insert(spec.name.clone(), self.fields.len());
                self.fields.push(spec);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&position| &self.fields[position])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Snapshot holding every field's default, then `input` merged on top
    pub fn initial_state(&self, input: Option<&Value>) -> Result<StateValues> {
        let mut state: StateValues = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.default.clone()))
            .collect();

        if let Some(input) = input {
            self.apply(&mut state, input)?;
        }
        Ok(state)
    }

    /// Merge a partial update into `state` field by field.
    ///
    /// `null` is an empty update. Unknown fields are rejected and leave `state` untouched.
    pub fn apply(&self, state: &mut StateValues, update: &Value) -> Result<()> {
        let update_obj = match update {
            Value::Null => return Ok(()),
            Value::Object(obj) => obj,
            other => {
                return Err(StateError::InvalidState(format!(
                    "Update must be an object, got {}",
                    other
                )))
            }
        };

        let mut merged = Vec::with_capacity(update_obj.len());
        for (field_name, update_value) in update_obj {
            let spec = self
                .get(field_name)
                .ok_or_else(|| StateError::UnknownField(field_name.clone()))?;
            let current = state.get(field_name).unwrap_or(&Value::Null);
            merged.push((field_name.clone(), spec.strategy.merge(current, update_value)?));
        }

        for (field_name, value) in merged {
            state.insert(field_name, value);
        }
        Ok(())
    }

    /// Field name to merge strategy fingerprint
    pub fn fingerprint(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.strategy.fingerprint()))
            .collect()
    }

    /// Check a stored snapshot against the declarations and fill newly declared fields.
    ///
    /// Fails when the snapshot holds an undeclared field, or when a field's recorded merge
    /// strategy differs from the declared one.
    pub fn reconcile(
        &self,
        stored_fingerprint: &BTreeMap<String, String>,
        values: &mut StateValues,
    ) -> Result<()> {
        if let Some(field) = values.keys().find(|name| self.get(name).is_none()) {
            return Err(StateError::SchemaMismatch(format!(
                "field '{}' is present in the snapshot but no longer declared",
                field
            )));
        }

        for (name, recorded) in stored_fingerprint {
            match self.get(name) {
                None => {
                    return Err(StateError::SchemaMismatch(format!(
                        "field '{}' was removed from the schema",
                        name
                    )))
                }
                Some(spec) => {
                    let declared = spec.strategy.fingerprint();
                    if &declared != recorded {
                        return Err(StateError::SchemaMismatch(format!(
                            "field '{}' was recorded as '{}' but is declared as '{}'",
                            name, recorded, declared
                        )));
                    }
                }
            }
        }

        for field in &self.fields {
            if !values.contains_key(&field.name) {
                values.insert(field.name.clone(), field.default.clone());
            }
        }
        Ok(())
    }
}

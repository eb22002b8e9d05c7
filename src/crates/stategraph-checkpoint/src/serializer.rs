//! Serialization protocol for checkpoint columns

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Storage backends encode every structured column through this protocol,
/// so an alternative wire format only needs a new implementation.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, Interrupt, PendingWrite, StateValues};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            any::<u64>().prop_map(|n| json!(n)),
            ".{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    #[test]
    fn test_json_serializer_checkpoint() {
        let serializer = JsonSerializer::new();
        let mut values = StateValues::new();
        values.insert("counter".to_string(), json!(3));
        let checkpoint = Checkpoint::new(values, vec!["next".to_string()]);

        let bytes = serializer.dumps(&checkpoint).unwrap();
        let restored: Checkpoint = serializer.loads(&bytes).unwrap();

        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn test_json_serializer_rejects_garbage() {
        let serializer = JsonSerializer::new();
        let result: Result<Checkpoint> = serializer.loads(b"not json");
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn test_interrupt_payload_round_trips_losslessly(
            payload in json_value(),
            resume_values in prop::collection::vec(json_value(), 0..3),
        ) {
            let serializer = JsonSerializer::new();
            let interrupt = Interrupt::new("review", payload).with_resume_values(resume_values);

            let bytes = serializer.dumps(&interrupt).unwrap();
            let restored: Interrupt = serializer.loads(&bytes).unwrap();
            prop_assert_eq!(restored, interrupt);
        }

        #[test]
        fn test_suspended_checkpoint_round_trips_losslessly(
            fields in prop::collection::btree_map("[a-z]{1,6}", json_value(), 0..5),
            payload in json_value(),
            sibling_update in json_value(),
        ) {
            let serializer = JsonSerializer::new();
            let values: StateValues = fields.into_iter().collect();
            let mut checkpoint = Checkpoint::new(values, vec!["approve".to_string()]);
            checkpoint.interrupt = Some(Interrupt::new("approve", payload));
            checkpoint.pending_writes = vec![PendingWrite::update("collect", sibling_update)];

            let bytes = serializer.dumps(&checkpoint).unwrap();
            let restored: Checkpoint = serializer.loads(&bytes).unwrap();
            prop_assert_eq!(restored, checkpoint);
        }
    }
}

//! Reassembly of tool invocations from streamed fragments.
//!
//! Fragment boundaries are arbitrary: a single JSON token of the arguments may
//! be split over many fragments. Pieces are concatenated per index in arrival
//! order and nothing is parsed until the caller takes a snapshot.

use std::collections::BTreeMap;

use super::streaming::ToolCallFragment;
use super::types::ToolInvocation;

#[derive(Debug, Default, Clone)]
struct PartialInvocation {
    id: String,
    name: String,
    arguments: String,
}

/// Per-index buffers for the tool calls of one model turn.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    buffers: BTreeMap<u32, PartialInvocation>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every piece of `fragment` to the buffer for its index.
    pub fn ingest(&mut self, fragment: ToolCallFragment) {
        let buffer = self.buffers.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            buffer.id.push_str(&id);
        }
        if let Some(name) = fragment.name {
            buffer.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            buffer.arguments.push_str(&arguments);
        }
    }

    /// Buffered invocations in ascending index order.
    pub fn snapshot(&self) -> Vec<ToolInvocation> {
        self.buffers
            .values()
            .map(|b| ToolInvocation::new(b.id.clone(), b.name.clone(), b.arguments.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_split_arguments_reassemble() {
        let mut acc = ToolCallAccumulator::new();
        acc.ingest(ToolCallFragment::piece(0, r#"{"co"#));
        acc.ingest(ToolCallFragment::piece(0, r#"de":"print(1)"}"#));

        let calls = acc.snapshot();
        assert_eq!(calls.len(), 1);
        let parsed: Value = serde_json::from_str(calls[0].arguments()).unwrap();
        assert_eq!(parsed, serde_json::json!({"code": "print(1)"}));
    }

    #[test]
    fn test_id_and_name_pieces_concatenate() {
        let mut acc = ToolCallAccumulator::new();
        acc.ingest(ToolCallFragment {
            index: 0,
            id: Some("call_".to_string()),
            name: Some("run_code".to_string()),
            arguments: None,
        });
        acc.ingest(ToolCallFragment {
            index: 0,
            id: Some("abc".to_string()),
            name: Some("_capture".to_string()),
            arguments: Some("{}".to_string()),
        });

        let calls = acc.snapshot();
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].name(), "run_code_capture");
        assert_eq!(calls[0].arguments(), "{}");
    }

    #[test]
    fn test_interleaved_indices_come_out_sorted() {
        let mut acc = ToolCallAccumulator::new();
        acc.ingest(ToolCallFragment::start(1, "b", "run_code_capture"));
        acc.ingest(ToolCallFragment::start(0, "a", "run_code_capture"));
        acc.ingest(ToolCallFragment::piece(1, "{\"code\":"));
        acc.ingest(ToolCallFragment::piece(0, "{\"code\":\"x = 1\"}"));
        acc.ingest(ToolCallFragment::piece(1, "\"print(x)\"}"));

        let calls = acc.snapshot();
        assert_eq!(acc.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[1].id, "b");
        assert_eq!(calls[1].arguments(), "{\"code\":\"print(x)\"}");
    }

    #[test]
    fn test_single_character_fragments() {
        let payload = r#"{"code": "df.head()"}"#;
        let mut acc = ToolCallAccumulator::new();
        for ch in payload.chars() {
            acc.ingest(ToolCallFragment::piece(3, ch.to_string()));
        }
        assert_eq!(acc.snapshot()[0].arguments(), payload);
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.snapshot().is_empty());
    }
}

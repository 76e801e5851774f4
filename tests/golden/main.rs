//! Golden translation tests: captured payloads under `tests/golden/data`
//! are translated and compared against the expected JSON.

use std::fs;
use std::path::PathBuf;

use futures::StreamExt;
use serde::de::DeserializeOwned;

use gaud_bridge::config::TranslatorConfig;
use gaud_bridge::gateway::translate_stream;
use gaud_bridge::messages::{MessagesRequest, StreamEvent};
use gaud_bridge::providers::RecordStream;
use gaud_bridge::providers::transform::{sse, translate_request, translate_response};
use gaud_bridge::providers::types::ChatResponse;

pub struct GoldenTest {
    root: PathBuf,
}

impl GoldenTest {
    pub fn new() -> Self {
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
        let root = PathBuf::from(manifest_dir)
            .join("tests")
            .join("golden")
            .join("data");
        Self { root }
    }

    pub fn load_text(&self, file: &str) -> String {
        let path = self.root.join(file);
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read golden file: {path:?}"))
    }

    pub fn load_json<T: DeserializeOwned>(&self, file: &str) -> T {
        serde_json::from_str(&self.load_text(file))
            .unwrap_or_else(|e| panic!("Failed to parse golden file {file}: {e}"))
    }

    /// Compare as parsed values so formatting of the fixture does not matter.
    pub fn assert_json<T: serde::Serialize>(&self, file: &str, actual: &T) {
        let expected: serde_json::Value = self.load_json(file);
        let actual = serde_json::to_value(actual).expect("Failed to serialize actual value");
        assert_eq!(
            expected,
            actual,
            "Golden test failed for {file}\nActual:\n{}",
            serde_json::to_string_pretty(&actual).unwrap_or_default()
        );
    }
}

#[test]
fn golden_request_tool_round_trip() {
    let golden = GoldenTest::new();
    let request: MessagesRequest = golden.load_json("request_tool_round_trip.input.json");
    let translated = translate_request(&request, &TranslatorConfig::default()).unwrap();
    golden.assert_json("request_tool_round_trip.expected.json", &translated);
}

#[test]
fn golden_request_image_and_tool_error() {
    let golden = GoldenTest::new();
    let request: MessagesRequest = golden.load_json("request_image_tool_error.input.json");
    let translated = translate_request(&request, &TranslatorConfig::default()).unwrap();
    golden.assert_json("request_image_tool_error.expected.json", &translated);
}

#[test]
fn golden_response_text_and_tool() {
    let golden = GoldenTest::new();
    let response: ChatResponse = golden.load_json("response_text_and_tool.input.json");
    let translated = translate_response(response, "claude-opus-4-1").unwrap();
    golden.assert_json("response_text_and_tool.expected.json", &translated);
}

#[tokio::test]
async fn golden_stream_text_then_tool() {
    let golden = GoldenTest::new();
    let records = sse::parse_body(&golden.load_text("stream_text_then_tool.sse"));
    let records: RecordStream = Box::pin(futures::stream::iter(records.into_iter().map(Ok)));

    let events: Vec<StreamEvent> = translate_stream(records, "claude-opus-4-1".to_string())
        .collect()
        .await;
    golden.assert_json("stream_text_then_tool.expected.json", &events);
}

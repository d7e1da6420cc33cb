// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-output `response_format` types for the injected chat
//! collaborator, matching the OpenAI Chat Completions "structured outputs"
//! contract named in the external-interfaces section.
use serde::{Deserialize, Serialize};

/// The `response_format` a chat call is made under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text output.
    Text,
    /// JSON object output (valid JSON, unconstrained shape).
    JsonObject,
    /// JSON output conforming to a specific JSON Schema.
    JsonSchema {
        /// The schema specification.
        json_schema: JsonSchemaSpec,
    },
}

/// A JSON Schema specification for structured output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSchemaSpec {
    /// Human-readable schema name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The JSON Schema itself.
    pub schema: serde_json::Value,
    /// Whether to enforce strict schema adherence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ResponseFormat {
    /// Plain text response format.
    #[must_use]
    pub fn text() -> Self {
        Self::Text
    }

    /// Unconstrained JSON object response format.
    #[must_use]
    pub fn json_object() -> Self {
        Self::JsonObject
    }

    /// JSON Schema response format.
    #[must_use]
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::JsonSchema {
            json_schema: JsonSchemaSpec {
                name: name.into(),
                description: None,
                schema,
                strict: Some(true),
            },
        }
    }

    /// The `{extractedOpinionList: array[string]}` schema used by extraction.
    pub fn extraction_schema() -> Self {
        Self::json_schema(
            "extracted_opinions",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "extractedOpinionList": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["extractedOpinionList"],
                "additionalProperties": false
            }),
        )
    }

    /// The `{label: string, description: string}` schema used by both
    /// labelling stages.
    pub fn label_schema() -> Self {
        Self::json_schema(
            "cluster_label",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "label": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["label", "description"],
                "additionalProperties": false
            }),
        )
    }

    /// The `{summary: string}` schema used by the overview stage.
    pub fn overview_schema() -> Self {
        Self::json_schema(
            "overview_summary",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" }
                },
                "required": ["summary"],
                "additionalProperties": false
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_serializes_as_tagged_variant() {
        let json = serde_json::to_value(ResponseFormat::text()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text"}));
    }

    #[test]
    fn extraction_schema_round_trips() {
        let fmt = ResponseFormat::extraction_schema();
        let json = serde_json::to_value(&fmt).unwrap();
        let back: ResponseFormat = serde_json::from_value(json).unwrap();
        assert_eq!(back, fmt);
    }
}

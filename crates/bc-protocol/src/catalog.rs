//! Request bodies and the read-only tool catalog.

use serde::{Deserialize, Serialize};

/// Body of a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One tool the agent can call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Response of the tool listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCatalog {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_body() {
        let json = serde_json::to_string(&ChatRequest::new("2+2?")).unwrap();
        assert_eq!(json, r#"{"message":"2+2?"}"#);
    }

    #[test]
    fn catalog_parses_tools() {
        let catalog: ToolCatalog = serde_json::from_str(
            r#"{"tools":[{"name":"calculator","description":"Evaluate arithmetic"},{"name":"clock"}]}"#,
        )
        .unwrap();
        assert_eq!(catalog.tools.len(), 2);
        assert_eq!(catalog.tools[0].name, "calculator");
        assert_eq!(catalog.tools[1].description, "");
    }

    #[test]
    fn catalog_without_tools_is_empty() {
        let catalog: ToolCatalog = serde_json::from_str("{}").unwrap();
        assert!(catalog.tools.is_empty());
    }
}

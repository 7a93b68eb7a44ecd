//! Query tool capability
//!
//! Every external data source the investigation loop can consult (person
//! lookup, place lookup, structured queries, GPS lookup) implements this
//! single-method trait. The loop never knows which concrete service sits
//! behind a tool.

use async_trait::async_trait;

use crate::types::{ToolError, ToolOutput};

/// Trait that all query tools must implement
#[async_trait]
pub trait QueryTool: Send + Sync {
    /// Returns the name of the tool (used in logs and run history)
    fn name(&self) -> &str;

    /// Send one target to the tool and return its reply
    async fn invoke(&self, target: &str) -> Result<ToolOutput, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl QueryTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, target: &str) -> Result<ToolOutput, ToolError> {
            if target.is_empty() {
                return Err(ToolError::InvalidTarget("empty".to_string()));
            }
            Ok(ToolOutput::text(target))
        }
    }

    #[tokio::test]
    async fn test_tool_as_trait_object() {
        let tool: Box<dyn QueryTool> = Box::new(EchoTool);
        assert_eq!(tool.name(), "echo");
        assert_eq!(
            tool.invoke("KRAKOW").await.unwrap(),
            ToolOutput::text("KRAKOW")
        );
        assert!(matches!(
            tool.invoke("").await,
            Err(ToolError::InvalidTarget(_))
        ));
    }
}

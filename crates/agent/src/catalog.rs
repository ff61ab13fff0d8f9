//! Turns the tool server's own tool descriptions into the declarations the
//! model is shown.

use mcplink_core::error::{CatalogError, Error};
use mcplink_core::tool::{InputSchema, ToolCatalog, ToolDeclaration, ToolDescriptor, ToolServer};
use tracing::{debug, info};

/// Build the session catalog from server descriptors, preserving order.
pub fn from_descriptors(descriptors: Vec<ToolDescriptor>) -> Result<ToolCatalog, CatalogError> {
    let declarations = descriptors
        .into_iter()
        .enumerate()
        .map(|(index, descriptor)| to_declaration(index, descriptor))
        .collect::<Result<Vec<_>, _>>()?;

    ToolCatalog::new(declarations)
}

/// Ask the server for its tools and adapt them.
pub async fn discover(server: &dyn ToolServer) -> Result<ToolCatalog, Error> {
    let descriptors = server.list_tools().await?;
    debug!(server = server.name(), count = descriptors.len(), "Received tool descriptors");

    let catalog = from_descriptors(descriptors)?;
    info!(tools = ?catalog.names(), "Tool catalog ready");
    Ok(catalog)
}

fn to_declaration(index: usize, descriptor: ToolDescriptor) -> Result<ToolDeclaration, CatalogError> {
    let name = descriptor.name.trim().to_string();
    if name.is_empty() {
        return Err(CatalogError::EmptyName { index });
    }

    let input_schema = normalize_schema(&name, descriptor.input_schema)?;

    Ok(ToolDeclaration {
        name,
        description: descriptor.description.unwrap_or_default(),
        input_schema,
    })
}

fn normalize_schema(name: &str, schema: serde_json::Value) -> Result<serde_json::Value, CatalogError> {
    if !schema.is_object() {
        return Err(CatalogError::InvalidSchema {
            name: name.into(),
            reason: "expected a JSON object".into(),
        });
    }

    let schema: InputSchema =
        serde_json::from_value(schema).map_err(|e| CatalogError::InvalidSchema {
            name: name.into(),
            reason: e.to_string(),
        })?;

    Ok(schema.to_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str, description: Option<&str>, schema: serde_json::Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: description.map(String::from),
            input_schema: schema,
        }
    }

    #[test]
    fn keeps_order_and_fields() {
        let catalog = from_descriptors(vec![
            descriptor(
                "get_current_time",
                Some("Current time in a timezone"),
                json!({"type": "object", "properties": {"timezone": {"type": "string"}}, "required": ["timezone"]}),
            ),
            descriptor("ping", None, json!({"type": "object"})),
        ])
        .unwrap();

        assert_eq!(catalog.names(), vec!["get_current_time", "ping"]);

        let time = catalog.get("get_current_time").unwrap();
        assert_eq!(time.description, "Current time in a timezone");
        assert_eq!(time.input_schema["required"], json!(["timezone"]));
        assert_eq!(time.input_schema["properties"]["timezone"]["type"], "string");

        let ping = catalog.get("ping").unwrap();
        assert_eq!(ping.description, "");
        assert_eq!(ping.input_schema, json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn required_only_when_present() {
        let catalog =
            from_descriptors(vec![descriptor("a", None, json!({"properties": {"x": {}}}))]).unwrap();
        let schema = &catalog.get("a").unwrap().input_schema;
        assert_eq!(schema["type"], "object");
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn extra_schema_keywords_survive() {
        let catalog = from_descriptors(vec![descriptor(
            "a",
            None,
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        )])
        .unwrap();
        assert_eq!(catalog.get("a").unwrap().input_schema["additionalProperties"], false);
    }

    #[test]
    fn empty_catalog_is_fine() {
        assert!(from_descriptors(vec![]).unwrap().is_empty());
    }

    #[test]
    fn empty_name_is_malformed() {
        let err = from_descriptors(vec![
            descriptor("ok", None, json!({})),
            descriptor("  ", None, json!({})),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::EmptyName { index: 1 }));
    }

    #[test]
    fn non_object_schema_is_malformed() {
        let err = from_descriptors(vec![descriptor("a", None, json!("string"))]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSchema { ref name, .. } if name == "a"));

        let err =
            from_descriptors(vec![descriptor("b", None, json!({"properties": []}))]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSchema { ref name, .. } if name == "b"));
    }

    #[test]
    fn duplicate_names_are_malformed() {
        let err = from_descriptors(vec![
            descriptor("a", None, json!({})),
            descriptor("a", None, json!({})),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName(ref name) if name == "a"));
    }
}

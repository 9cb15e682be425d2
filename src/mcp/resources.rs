//! MCP resource definitions.
//!
//! Resources are read-only views the client can fetch without calling a tool:
//!
//! - `csv://list` - the files in the CSV directory
//! - `csv://{filename}` - a preview of one file

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::analyzer::{render, CsvAnalyzer, Rendered};

/// URI scheme for all resources.
pub const SCHEME: &str = "csv://";

/// URI of the file listing.
pub const LIST_URI: &str = "csv://list";

/// URI template for file previews.
pub const PREVIEW_TEMPLATE: &str = "csv://{filename}";

const JSON_MIME: &str = "application/json";

/// A static resource for resources/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// A parameterised resource for resources/templates/list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Parameters for resources/read.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    /// The resource URI.
    pub uri: String,
}

/// Resource content returned by resources/read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// All static resources.
#[must_use]
pub fn list_resources() -> Vec<Resource> {
    vec![Resource {
        uri: LIST_URI.to_string(),
        name: "CSV files".to_string(),
        description: "List all CSV files in the configured directory with their sizes"
            .to_string(),
        mime_type: JSON_MIME.to_string(),
    }]
}

/// All resource templates.
#[must_use]
pub fn list_templates() -> Vec<ResourceTemplate> {
    vec![ResourceTemplate {
        uri_template: PREVIEW_TEMPLATE.to_string(),
        name: "CSV preview".to_string(),
        description: "First 10 rows, column names and inferred types of a CSV file"
            .to_string(),
        mime_type: JSON_MIME.to_string(),
    }]
}

/// Reads a resource by URI.
///
/// Returns `None` if the URI is not a `csv://` URI. The filename is
/// percent-decoded. Failures inside a recognised resource are reported in the
/// JSON text, like tool results.
#[must_use]
pub fn read_resource(analyzer: &CsvAnalyzer, uri: &str) -> Option<ResourceContent> {
    let target = uri.strip_prefix(SCHEME)?;

    let Rendered { text, .. } = if uri == LIST_URI {
        render(&analyzer.list_files())
    } else {
        if target.is_empty() {
            return None;
        }
        let filename = urlencoding::decode(target).unwrap_or(Cow::Borrowed(target));
        render(&analyzer.preview(&filename))
    };

    Some(ResourceContent {
        uri: uri.to_string(),
        mime_type: JSON_MIME.to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn definitions_use_the_csv_scheme() {
        assert!(list_resources().iter().all(|r| r.uri.starts_with(SCHEME)));
        assert!(list_templates()
            .iter()
            .all(|t| t.uri_template.starts_with(SCHEME)));
    }

    #[test]
    fn template_serialises_camel_case() {
        let json = serde_json::to_value(&list_templates()[0]).unwrap();
        assert_eq!(json["uriTemplate"], PREVIEW_TEMPLATE);
        assert_eq!(json["mimeType"], JSON_MIME);
    }

    #[test]
    fn reads_preview_and_listing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "id\n1\n").unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());

        let listing = read_resource(&analyzer, LIST_URI).unwrap();
        assert!(listing.text.contains("\"name\": \"a.csv\""));

        let preview = read_resource(&analyzer, "csv://a.csv").unwrap();
        assert_eq!(preview.uri, "csv://a.csv");
        assert!(preview.text.contains("\"rows\": 1"));
    }

    #[test]
    fn preview_filename_is_percent_decoded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("my data.csv"), "id\n1\n2\n").unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());

        let preview = read_resource(&analyzer, "csv://my%20data.csv").unwrap();
        assert_eq!(preview.uri, "csv://my%20data.csv");
        assert!(preview.text.contains("\"filename\": \"my data.csv\""));
        assert!(preview.text.contains("\"rows\": 2"));
    }

    #[test]
    fn decoded_traversal_is_still_denied() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        let content = read_resource(&analyzer, "csv://%2E%2E%2Fsecret.csv").unwrap();
        assert!(content.text.contains("Access denied"));
    }

    #[test]
    fn missing_file_is_reported_in_text() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        let content = read_resource(&analyzer, "csv://nope.csv").unwrap();
        assert!(content.text.contains("File nope.csv not found"));
    }

    #[test]
    fn foreign_uris_are_unknown() {
        let dir = tempdir().unwrap();
        let analyzer = CsvAnalyzer::new(dir.path());
        assert!(read_resource(&analyzer, "file:///etc/passwd").is_none());
        assert!(read_resource(&analyzer, "csv://").is_none());
    }
}

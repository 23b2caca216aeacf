use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One item of an environment's catalog index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub external_key: String,
}

/// A page (or probe) of the row-set read endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RowsetPage {
    pub count: Option<u64>,
    #[serde(default)]
    pub items: Vec<RowItem>,
}

/// A row as the read endpoint returns it: key columns and value columns
/// in separate maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowItem {
    #[serde(default)]
    pub keys: Map<String, Value>,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl RowItem {
    /// Flatten into the single record the write endpoint expects.
    /// A value column shadows a key column of the same name.
    pub fn merged(&self) -> Map<String, Value> {
        let mut record = self.keys.clone();
        for (name, value) in &self.values {
            record.insert(name.clone(), value.clone());
        }
        record
    }

    pub fn has_natural_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    /// Byte length of the row serialized as JSON.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WriteRowsBody<'a> {
    pub items: &'a [Map<String, Value>],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AsyncJobResponse {
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultsPage {
    #[serde(default)]
    pub items: Vec<RowResult>,
}

/// Outcome of one row of an async write job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_code")]
    pub error_code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl RowResult {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_code")]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
}

/// Error codes arrive as numbers or strings depending on the endpoint.
fn lenient_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merged_value_wins_on_collision() {
        let item: RowItem = serde_json::from_value(json!({
            "keys": {"id": "1", "email": "key@x"},
            "values": {"email": "value@x", "name": "Ada"}
        }))
        .unwrap();
        let merged = item.merged();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["id"], "1");
        assert_eq!(merged["email"], "value@x");
        assert_eq!(merged["name"], "Ada");
    }

    #[test]
    fn test_row_without_keys() {
        let item: RowItem = serde_json::from_value(json!({"values": {"a": 1}})).unwrap();
        assert!(!item.has_natural_key());
        assert_eq!(item.field_count(), 1);
    }

    #[test]
    fn test_serialized_len_grows_with_content() {
        let small: RowItem = serde_json::from_value(json!({"values": {"a": "x"}})).unwrap();
        let large: RowItem =
            serde_json::from_value(json!({"values": {"a": "x".repeat(4000)}})).unwrap();
        assert!(small.serialized_len() < 100);
        assert!(large.serialized_len() > 4000);
    }

    #[test]
    fn test_rowset_page_parse() {
        let page: RowsetPage = serde_json::from_value(json!({
            "links": {"self": "/v1/customobjectdata/token/x/rowset?$page=1"},
            "requestToken": "abc",
            "page": 1,
            "pageSize": 1,
            "count": 12000,
            "items": [{"keys": {"id": "1"}, "values": {"name": "Ada"}}]
        }))
        .unwrap();
        assert_eq!(page.count, Some(12000));
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].has_natural_key());
    }

    #[test]
    fn test_row_result_numeric_codes() {
        let result: RowResult = serde_json::from_value(json!({
            "status": "Error",
            "errorCode": 10006,
            "message": "Errors Occurred",
            "errors": [{"name": "Email", "errorCode": "10006", "errorMessage": "Invalid email"}]
        }))
        .unwrap();
        assert!(result.is_error());
        assert_eq!(result.error_code, "10006");
        assert_eq!(result.errors[0].error_code, "10006");
        assert_eq!(result.errors[0].name, "Email");
    }

    #[test]
    fn test_row_result_success_defaults() {
        let result: RowResult = serde_json::from_value(json!({"status": "OK"})).unwrap();
        assert!(!result.is_error());
        assert!(result.errors.is_empty());
        assert_eq!(result.error_code, "");
    }

    #[test]
    fn test_async_job_response() {
        let resp: AsyncJobResponse =
            serde_json::from_value(json!({"requestId": "f0c1", "resultMessages": []})).unwrap();
        assert_eq!(resp.request_id.as_deref(), Some("f0c1"));
    }
}

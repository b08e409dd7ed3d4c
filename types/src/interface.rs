//! YAPI interface documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope wrapping every YAPI API response.
///
/// YAPI reports application errors with HTTP 200 and a non-zero `errcode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapiEnvelope<T> {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    pub data: Option<T>,
}

impl<T> YapiEnvelope<T> {
    /// Whether the upstream reported success.
    pub fn is_ok(&self) -> bool {
        self.errcode == 0
    }
}

/// One page of the interface list endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceListPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default)]
    pub list: Vec<InterfaceSummary>,
}

/// An entry of the interface list.
///
/// Only the fields needed for lookups are typed; everything else the
/// upstream sends is kept in `extra` and serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSummary {
    #[serde(rename = "_id")]
    pub id: Value,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InterfaceSummary {
    /// The interface id as sent back to the detail endpoint.
    ///
    /// YAPI emits numeric ids, but string ids are accepted as well.
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_keeps_unknown_fields() {
        let raw = json!({
            "_id": 42,
            "title": "Get user",
            "path": "/api/user",
            "method": "GET",
            "catid": 7,
            "status": "done"
        });

        let summary: InterfaceSummary = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(summary.id_string(), "42");
        assert_eq!(summary.title, "Get user");
        assert_eq!(summary.extra["catid"], 7);

        let back = serde_json::to_value(&summary).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_string_id() {
        let summary: InterfaceSummary =
            serde_json::from_value(json!({"_id": "abc", "title": "t", "path": "/p"})).unwrap();
        assert_eq!(summary.id_string(), "abc");
    }

    #[test]
    fn test_envelope_error() {
        let envelope: YapiEnvelope<Value> =
            serde_json::from_value(json!({"errcode": 40011, "errmsg": "token invalid"})).unwrap();
        assert!(!envelope.is_ok());
        assert!(envelope.data.is_none());
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: Value) -> YapiEnvelope<T> {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_envelope_payload_needs_no_default() {
        #[derive(Debug, Deserialize)]
        struct Detail {
            title: String,
        }

        let envelope: YapiEnvelope<Detail> = decode(json!({"errcode": 0}));
        assert!(envelope.is_ok());
        assert!(envelope.data.is_none());

        let envelope: YapiEnvelope<Detail> =
            decode(json!({"errcode": 0, "data": {"title": "Login"}}));
        assert_eq!(envelope.data.unwrap().title, "Login");
    }

    #[test]
    fn test_list_page_defaults() {
        let page: InterfaceListPage =
            serde_json::from_value(json!({"count": 1, "total": 1})).unwrap();
        assert!(page.list.is_empty());
    }
}

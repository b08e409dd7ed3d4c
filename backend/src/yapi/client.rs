use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use yapi_mcp_types::{InterfaceListPage, InterfaceSummary, YapiEnvelope, LIST_PAGE_SIZE};

use super::{InterfaceSource, Result, YapiError};
use crate::config::YapiSettings;

/// HTTP client for the YAPI open API
#[derive(Clone, Debug)]
pub struct YapiClient {
    settings: YapiSettings,
    client: Client,
}

impl YapiClient {
    pub fn new(settings: YapiSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
        }
    }

    /// Issue a GET against `endpoint` and unwrap the YAPI envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let query = query
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}{}?{}", self.settings.base_url, endpoint, query);
        debug!("YAPI GET {}", endpoint);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(YapiError::Status { endpoint, status });
        }

        let envelope: YapiEnvelope<T> = response.json().await?;
        if !envelope.is_ok() {
            return Err(YapiError::Api {
                errcode: envelope.errcode,
                errmsg: envelope.errmsg,
            });
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl InterfaceSource for YapiClient {
    async fn list_interfaces(&self) -> Result<Vec<InterfaceSummary>> {
        let limit = LIST_PAGE_SIZE.to_string();
        let query = [
            ("token", self.settings.token.as_str()),
            ("project_id", self.settings.project_id.as_str()),
            ("page", "1"),
            ("limit", limit.as_str()),
        ];

        match self
            .get::<InterfaceListPage>("/api/interface/list", &query)
            .await
        {
            Ok(page) => Ok(page.map(|p| p.list).unwrap_or_default()),
            Err(e) => {
                error!("Error listing interfaces: {}", e);
                Err(e)
            }
        }
    }

    async fn get_interface(&self, id: &str) -> Result<Value> {
        let query = [("token", self.settings.token.as_str()), ("id", id)];

        match self.get::<Value>("/api/interface/get", &query).await {
            Ok(data) => Ok(data.unwrap_or(Value::Null)),
            Err(e) => {
                error!("Error fetching interface {}: {}", id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> YapiClient {
        YapiClient::new(YapiSettings::new(format!("{}/", server.uri()), "tok", "7"))
    }

    #[tokio::test]
    async fn test_list_requests_first_page_of_100() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/interface/list"))
            .and(query_param("token", "tok"))
            .and(query_param("project_id", "7"))
            .and(query_param("page", "1"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "成功！",
                "data": {
                    "count": 3,
                    "total": 250,
                    "list": [
                        { "_id": 11, "title": "A", "path": "/a", "method": "GET" },
                        { "_id": 12, "title": "B", "path": "/b", "method": "POST" }
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let list = client_for(&server).list_interfaces().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].title, "B");
    }

    #[tokio::test]
    async fn test_get_interface_returns_data() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .and(query_param("token", "tok"))
            .and(query_param("id", "123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "成功！",
                "data": { "_id": 123, "title": "Login", "req_body_other": "{}" }
            })))
            .mount(&server)
            .await;

        let detail = client_for(&server).get_interface("123").await.unwrap();
        assert_eq!(detail["title"], "Login");
    }

    #[tokio::test]
    async fn test_errcode_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 40011,
                "errmsg": "请登录...",
                "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).get_interface("1").await.unwrap_err();
        assert!(matches!(err, YapiError::Api { errcode: 40011, .. }));
    }

    #[tokio::test]
    async fn test_http_failure_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/interface/list"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).list_interfaces().await.unwrap_err();
        assert!(matches!(err, YapiError::Status { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_by_path_relists_every_call() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/interface/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "data": { "list": [ { "_id": 5, "title": "Five", "path": "/five" } ] }
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/interface/get"))
            .and(query_param("id", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "data": { "_id": 5, "title": "Five" }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.get_interface_by_path("/five").await.unwrap();
        let second = client.get_interface_by_name("Five").await.unwrap();
        assert_eq!(first, second);
    }
}

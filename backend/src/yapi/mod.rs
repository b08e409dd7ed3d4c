//! Access to the upstream YAPI documentation server.

mod client;

pub use client::YapiClient;

use async_trait::async_trait;
use serde_json::Value;
use yapi_mcp_types::InterfaceSummary;

/// Error type for YAPI operations.
#[derive(Debug, thiserror::Error)]
pub enum YapiError {
    #[error("Request to YAPI failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("YAPI returned HTTP {status} for {endpoint}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("YAPI error {errcode}: {errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error("Interface with {field} {value} not found")]
    NotFound { field: &'static str, value: String },
}

impl YapiError {
    /// Whether this is a lookup miss rather than an upstream failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, YapiError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, YapiError>;

/// Source of interface documents.
///
/// `find_by_path` and `find_by_name` re-list on every call; nothing is cached.
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    /// First page of the project's interfaces.
    async fn list_interfaces(&self) -> Result<Vec<InterfaceSummary>>;

    /// Full interface document.
    async fn get_interface(&self, id: &str) -> Result<Value>;

    /// Full document of the interface whose `path` equals `path`.
    async fn get_interface_by_path(&self, path: &str) -> Result<Value> {
        let interfaces = self.list_interfaces().await?;
        let item = interfaces
            .iter()
            .find(|item| item.path == path)
            .ok_or_else(|| YapiError::NotFound {
                field: "path",
                value: path.to_string(),
            })?;
        self.get_interface(&item.id_string()).await
    }

    /// Full document of the interface whose `title` equals `name`.
    async fn get_interface_by_name(&self, name: &str) -> Result<Value> {
        let interfaces = self.list_interfaces().await?;
        let item = interfaces
            .iter()
            .find(|item| item.title == name)
            .ok_or_else(|| YapiError::NotFound {
                field: "name",
                value: name.to_string(),
            })?;
        self.get_interface(&item.id_string()).await
    }
}

//! 远程虚拟机（沙箱）开通与会话句柄
//!
//! 通过沙箱供应商 HTTP API 开通一台远程计算机并返回不透明句柄；
//! 核心只持有句柄引用，不负责销毁，沙箱生命周期归供应商管理。

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 沙箱操作系统类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Linux,
    Macos,
    Windows,
}

/// 沙箱供应商类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Cloud,
    Docker,
}

/// 已开通的远程计算机句柄：编排器只读取 id，不窥探内部
#[derive(Clone, Debug, Deserialize)]
pub struct Computer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Serialize)]
struct ProvisionRequest<'a> {
    os_type: OsType,
    name: &'a str,
    provider_type: ProviderType,
}

/// 沙箱开通客户端
pub struct ComputerProvisioner {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ComputerProvisioner {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::Provisioning(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// 开通一台远程计算机并返回句柄；失败不自动重试
    pub async fn provision(
        &self,
        os_type: OsType,
        name: &str,
        provider_type: ProviderType,
    ) -> Result<Computer, AgentError> {
        let url = format!("{}/v1/sandboxes", self.base_url);
        let request = ProvisionRequest {
            os_type,
            name,
            provider_type,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Provisioning(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(AgentError::Provisioning(format!(
                "sandbox endpoint returned {}: {}",
                status, snippet
            )));
        }

        let computer: Computer = resp
            .json()
            .await
            .map_err(|e| AgentError::Provisioning(format!("invalid sandbox payload: {}", e)))?;

        tracing::info!("Provisioned sandbox {} ({:?})", computer.id, os_type);
        Ok(computer)
    }
}

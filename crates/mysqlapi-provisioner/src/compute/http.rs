// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute client speaking JSON to an HTTP compute gateway.
//!
//! Endpoints:
//! - `POST /instances` boots an instance and answers `{"id": ...}`
//! - `GET /instances/{id}` describes it (`ip_address`, `private_ip_address`, `state`)
//! - `POST /instances/{id}/authorize` / `DELETE /instances/{id}/authorize` open
//!   and close the database port
//! - `DELETE /instances/{id}` terminates it

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::*;
use crate::config::ComputeConfig;
use crate::models::Instance;

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
    security_groups: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
}

/// Instance description returned by the gateway.
#[derive(Debug, Deserialize)]
struct InstanceDescription {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    private_ip_address: Option<String>,
}

impl InstanceDescription {
    /// A public address distinct from the private one means networking is up.
    fn public_address(&self) -> Option<&str> {
        match (&self.ip_address, &self.private_ip_address) {
            (Some(public), private) if !public.is_empty() && private.as_ref() != Some(public) => {
                Some(public.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest {
    port: u16,
}

/// HTTP compute gateway client.
pub struct HttpComputeClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    image: String,
    key_name: Option<String>,
}

impl HttpComputeClient {
    /// Create a client for the configured gateway.
    pub fn new(config: &ComputeConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            image: config.image.clone(),
            key_name: config.key_name.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.endpoint, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn status_error(response: reqwest::Response) -> ComputeError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ComputeError::Status { status, body }
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    fn client_type(&self) -> &'static str {
        "http"
    }

    async fn run(&self, instance: &mut Instance) -> Result<bool> {
        let body = RunRequest {
            image: &self.image,
            key_name: self.key_name.as_deref(),
            security_groups: ["default"],
        };

        let response = self
            .request(Method::POST, "/instances")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::status_error(response).await;
            warn!(instance = %instance.name, error = %err, "Compute gateway rejected boot request");
            return Ok(false);
        }

        let booted: RunResponse = response.json().await?;
        debug!(instance = %instance.name, compute_id = %booted.id, "Compute instance requested");
        instance.compute_id = Some(booted.id);
        Ok(true)
    }

    async fn get(&self, instance: &mut Instance) -> Result<bool> {
        let id = compute_id(instance)?.to_string();
        let response = self
            .request(Method::GET, &format!("/instances/{}", id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let description: InstanceDescription = response.json().await?;
        match description.public_address() {
            Some(address) => {
                debug!(
                    instance = %instance.name,
                    compute_id = %id,
                    host = %address,
                    state = description.state.as_deref().unwrap_or("unknown"),
                    "Compute instance reachable"
                );
                instance.host = Some(address.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn authorize(&self, instance: &Instance) -> Result<bool> {
        let id = compute_id(instance)?;
        let response = self
            .request(Method::POST, &format!("/instances/{}/authorize", id))
            .json(&AuthorizeRequest {
                port: instance.port,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::status_error(response).await;
            warn!(instance = %instance.name, error = %err, "Authorize refused");
            return Ok(false);
        }
        Ok(true)
    }

    async fn unauthorize(&self, instance: &Instance) -> Result<bool> {
        let id = compute_id(instance)?;
        let response = self
            .request(Method::DELETE, &format!("/instances/{}/authorize", id))
            .json(&AuthorizeRequest {
                port: instance.port,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::status_error(response).await;
            warn!(instance = %instance.name, error = %err, "Unauthorize refused");
            return Ok(false);
        }
        Ok(true)
    }

    async fn terminate(&self, instance: &Instance) -> Result<bool> {
        let id = compute_id(instance)?;
        let response = self
            .request(Method::DELETE, &format!("/instances/{}", id))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => {
                debug!(instance = %instance.name, compute_id = %id, "Compute instance already gone");
                Ok(true)
            }
            _ => {
                let err = Self::status_error(response).await;
                warn!(instance = %instance.name, error = %err, "Terminate refused");
                Ok(false)
            }
        }
    }
}

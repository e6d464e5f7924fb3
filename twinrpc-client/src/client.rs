//! High-level client API.

use crate::connection::{self, ConnectionConfig};
use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use twinrpc_core::{ConnectionError, Endpoint, MethodLookup, MethodTable, ResponseHandle};
use twinrpc_protocol::Params;

/// High-level client for twinrpc.
///
/// The connection is symmetric: methods passed to [`Client::connect_with`]
/// can be called by the server while the client is connected. Dropping the
/// client closes the connection.
pub struct Client {
    endpoint: Endpoint,
    config: ConnectionConfig,
}

impl Client {
    /// Connects to the server without exposing any methods to it.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        Self::connect_with(config, MethodTable::new()).await
    }

    /// Connects to the server, serving `lookup` to it.
    pub async fn connect_with(
        config: ConnectionConfig,
        lookup: impl MethodLookup + 'static,
    ) -> Result<Self, ClientError> {
        let lookup: Arc<dyn MethodLookup> = Arc::new(lookup);
        let endpoint = connection::open(&config, lookup).await?;
        Ok(Self { endpoint, config })
    }

    /// Sends a request and waits for its result.
    ///
    /// With a request timeout configured, an expired request is cancelled so
    /// that a late response is ignored.
    pub async fn request(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<Value, ClientError> {
        let handle = self.send(method, params)?;
        let id = handle.id().to_string();

        let result = match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handle).await.map_err(|_| {
                tracing::debug!("Request id={} timed out", id);
                ClientError::Timeout
            })?,
            None => handle.await,
        };

        Ok(result?)
    }

    /// Sends a request and decodes its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<T, ClientError> {
        let result = self.request(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Sends a request and returns its completion handle without waiting.
    pub fn send(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<ResponseHandle, ClientError> {
        Ok(self.endpoint.request(method, params)?)
    }

    /// Sends a notification.
    pub fn notify(&self, method: &str, params: impl Into<Params>) -> Result<(), ClientError> {
        Ok(self.endpoint.notify(method, params)?)
    }

    /// Returns whether the connection is still active.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_active()
    }

    /// Closes the connection. Pending requests fail with `Closed`.
    pub fn close(&self) {
        self.endpoint.close();
    }

    /// Waits until the connection ends and returns why.
    pub async fn closed(&self) -> ConnectionError {
        self.endpoint.closed().await
    }

    /// Returns the underlying connection endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.endpoint.close();
    }
}

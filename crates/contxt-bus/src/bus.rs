//! Per-organization connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use contxt_core::{IdGenerator, OrganizationId, UuidGenerator};
use contxt_settings::ApiSettings;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::MessageBusConnection;
use crate::errors::BusError;
use crate::websocket;

/// Opens and caches one [`MessageBusConnection`] per organization.
///
/// Connections are opened against
/// `<base_url>/organizations/<organization_id>/stream` with the configured
/// token as a bearer header. A cached connection that is no longer open is
/// replaced on the next [`MessageBus::connect`].
pub struct MessageBus {
    api: ApiSettings,
    ids: Arc<dyn IdGenerator>,
    connections: Mutex<HashMap<OrganizationId, MessageBusConnection>>,
}

impl MessageBus {
    /// Registry using `api` for the endpoint and token.
    pub fn new(api: ApiSettings) -> Self {
        Self::with_id_generator(api, Arc::new(UuidGenerator))
    }

    /// Like [`Self::new`]; every opened connection uses `ids`.
    pub fn with_id_generator(api: ApiSettings, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            api,
            ids,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Stream endpoint for an organization.
    pub fn stream_url(&self, organization_id: &OrganizationId) -> String {
        format!(
            "{}/organizations/{organization_id}/stream",
            self.api.base_url.trim_end_matches('/')
        )
    }

    /// The organization's connection, opening it if needed.
    pub async fn connect(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<MessageBusConnection, BusError> {
        if organization_id.is_empty() {
            return Err(BusError::MissingArgument(
                "An organization ID is required for connecting",
            ));
        }

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(organization_id) {
            if existing.is_connected() {
                return Ok(existing.clone());
            }
            debug!(organization_id = %organization_id, "replacing closed connection");
        }

        let url = self.stream_url(organization_id);
        let connection = websocket::connect_with_id_generator(
            &url,
            self.api.token.as_deref(),
            Arc::clone(&self.ids),
        )
        .await?;
        info!(
            organization_id = %organization_id,
            conn_id = connection.id(),
            "connected to message bus"
        );
        let _ = connections.insert(organization_id.clone(), connection.clone());
        Ok(connection)
    }

    /// The cached connection for an organization, if any.
    pub async fn connection(&self, organization_id: &OrganizationId) -> Option<MessageBusConnection> {
        self.connections.lock().await.get(organization_id).cloned()
    }

    /// Close and forget the organization's connection. Returns whether one
    /// was cached.
    pub async fn disconnect(&self, organization_id: &OrganizationId) -> bool {
        let Some(connection) = self.connections.lock().await.remove(organization_id) else {
            return false;
        };
        connection.close();
        true
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("base_url", &self.api.base_url)
            .finish_non_exhaustive()
    }
}

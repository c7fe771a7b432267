//! Quote of the day.

use serde_json::Value;
use tracing::instrument;

use crate::client::{Gateway, NO_QUERY};
use crate::error::GatewayError;

impl Gateway {
    /// Fetch a random quote. The payload is returned as the service sent it
    /// (`hitokoto`, `from`, `from_who`, ...).
    #[instrument(skip(self), level = "info")]
    pub async fn get_hitokoto(&self) -> Result<Value, GatewayError> {
        self.get_json(&self.endpoints.hitokoto, NO_QUERY).await
    }
}

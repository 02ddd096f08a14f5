//! Elasticsearch audit sink for `gateway-core`, behind the `audit-elastic`
//! feature flag. Bring your own `elasticsearch::Elasticsearch` client;
//! entries are indexed as JSON on a detached task, logging failures rather
//! than surfacing them back to the compliance pipeline's synchronous
//! `AuditSink::record`.

use elasticsearch::IndexParts;
use gateway_core::compliance::{AuditEntry, AuditSink};
use gateway_core::gateway_error::GatewayError;

#[derive(Clone, Debug)]
pub struct ElasticAuditSink {
    index: String,
    client: elasticsearch::Elasticsearch,
}

impl ElasticAuditSink {
    /// Create a sink with an existing Elasticsearch client and target index.
    pub fn new(client: elasticsearch::Elasticsearch, index: impl Into<String>) -> Result<Self, String> {
        let index = index.into();
        if index.is_empty() {
            return Err("index name cannot be empty".to_string());
        }
        Ok(Self { index, client })
    }
}

impl AuditSink for ElasticAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), GatewayError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| GatewayError::Config("elasticsearch audit sink requires a tokio runtime".into()))?;

        let client = self.client.clone();
        let index = self.index.clone();
        let body = serde_json::to_value(entry)
            .map_err(|e| GatewayError::Config(format!("audit entry is not serializable: {e}")))?;

        handle.spawn(async move {
            if let Err(e) = client.index(IndexParts::Index(&index)).body(body).send().await {
                tracing::error!("failed to index audit entry into {}: {}", index, e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_index_name() {
        let client = elasticsearch::Elasticsearch::default();
        assert!(ElasticAuditSink::new(client, "").is_err());
    }
}

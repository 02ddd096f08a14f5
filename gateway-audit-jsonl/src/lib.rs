//! JSON-Lines audit sink for `gateway-core`. Writes one entry per line,
//! flushed and fsynced before `record` returns — the default durable sink
//! for the compliance pipeline's audit log.

use gateway_core::compliance::{AuditEntry, AuditSink};
use gateway_core::gateway_error::GatewayError;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug)]
pub struct JsonlAuditSink {
    path: String,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditEntry) -> Result<(), GatewayError> {
        let _guard = self.lock.lock().unwrap();
        let line = serde_json::to_string(entry)
            .map_err(|e| GatewayError::Config(format!("audit entry is not serializable: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GatewayError::Config(format!("failed to open audit log {}: {e}", self.path)))?;
        writeln!(file, "{line}")
            .map_err(|e| GatewayError::Config(format!("failed to write audit log {}: {e}", self.path)))?;
        file.sync_all()
            .map_err(|e| GatewayError::Config(format!("failed to fsync audit log {}: {e}", self.path)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::new(path.to_str().unwrap());

        sink.record(&AuditEntry {
            id: "audit_1".into(),
            timestamp: 1,
            action: "compliance.mask".into(),
            details: json!({"service": "paystack"}),
        })
        .unwrap();
        sink.record(&AuditEntry {
            id: "audit_2".into(),
            timestamp: 2,
            action: "compliance.consent_checked".into(),
            details: json!({"field": "email"}),
        })
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], "audit_1");
    }
}

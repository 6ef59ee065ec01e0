//! Per-build audit trail of delivery attempts.

use crate::build::{BuildLayout, BuildReference};
use crate::error::{DispatchError, DispatchResult};
use chrono::{DateTime, SecondsFormat, Utc};
use dispatcher_config_and_utils::ServerConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Outcome of one upload attempt for one build.
///
/// Serialized as `{location, sharedSpace, pushed, id?, temporarilyUnavailable?, date}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub location: String,
    pub shared_space: String,
    pub pushed: bool,
    /// Server-side id, present only when pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Present only on "server busy" failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporarily_unavailable: Option<bool>,
    pub date: String,
}

impl AuditRecord {
    pub fn pushed(server: &ServerConfig, id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            ..Self::base(server, true, now)
        }
    }

    pub fn temporarily_unavailable(server: &ServerConfig, now: DateTime<Utc>) -> Self {
        Self {
            temporarily_unavailable: Some(true),
            ..Self::base(server, false, now)
        }
    }

    pub fn failed(server: &ServerConfig, now: DateTime<Utc>) -> Self {
        Self::base(server, false, now)
    }

    fn base(server: &ServerConfig, pushed: bool, now: DateTime<Utc>) -> Self {
        Self {
            location: server.location.clone(),
            shared_space: server.shared_space_id.clone(),
            pushed,
            id: None,
            temporarily_unavailable: None,
            date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Append-only store of audit records, one ordered sequence per build.
pub trait AuditLog: Send + Sync {
    /// Durably append a record; visible to readers once this returns.
    fn append(&self, reference: &BuildReference, record: &AuditRecord) -> DispatchResult<()>;

    /// All records of a build in append order (empty if none).
    fn records(&self, reference: &BuildReference) -> DispatchResult<Vec<AuditRecord>>;
}

/// Audit log stored as a JSON array next to each build's artifacts.
///
/// The file does not exist until the first attempt is recorded. Appends
/// rewrite the whole array through a temp file and an atomic rename.
pub struct FileAuditLog {
    layout: BuildLayout,
    write_lock: Mutex<()>,
}

impl FileAuditLog {
    pub fn new(layout: BuildLayout) -> Self {
        Self {
            layout,
            write_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    fn read_records(path: &Path) -> DispatchResult<Vec<AuditRecord>> {
        match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, reference: &BuildReference, record: &AuditRecord) -> DispatchResult<()> {
        let _guard = self.write_lock.lock();
        let path = self.layout.audit_file(reference);

        let mut records = Self::read_records(&path)?;
        records.push(record.clone());
        let content = serde_json::to_string_pretty(&records)?;

        atomic_write(&path, &content)
    }

    fn records(&self, reference: &BuildReference) -> DispatchResult<Vec<AuditRecord>> {
        Self::read_records(&self.layout.audit_file(reference))
    }
}

fn atomic_write(path: &Path, content: &str) -> DispatchResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| DispatchError::Audit(format!("no parent for {}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| DispatchError::Audit(format!("bad audit path {}", path.display())))?;

    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));
    let write_result = (|| -> Result<(), io::Error> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn server() -> ServerConfig {
        ServerConfig::from_ui_location("http://localhost:8008/ui/?p=1001/1002", "u", "p").unwrap()
    }

    #[test]
    fn pushed_record_json_shape() {
        let record = AuditRecord::pushed(&server(), 1, Utc::now());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["location"], "http://localhost:8008");
        assert_eq!(json["sharedSpace"], "1001");
        assert_eq!(json["pushed"], true);
        assert_eq!(json["id"], 1);
        assert!(json.get("temporarilyUnavailable").is_none());
        assert!(json["date"].is_string());
    }

    #[test]
    fn failed_records_json_shape() {
        let failed = serde_json::to_value(AuditRecord::failed(&server(), Utc::now())).unwrap();
        assert_eq!(failed["pushed"], false);
        assert!(failed.get("id").is_none());
        assert!(failed.get("temporarilyUnavailable").is_none());

        let busy = serde_json::to_value(AuditRecord::temporarily_unavailable(
            &server(),
            Utc::now(),
        ))
        .unwrap();
        assert_eq!(busy["pushed"], false);
        assert_eq!(busy["temporarilyUnavailable"], true);
        assert!(busy.get("id").is_none());
    }

    #[test]
    fn file_absent_until_first_append() {
        let dir = tempdir().unwrap();
        let log = FileAuditLog::new(BuildLayout::new(dir.path()));
        let reference = BuildReference::new("app", 1);

        assert!(!log.layout().audit_file(&reference).exists());
        assert!(log.records(&reference).unwrap().is_empty());
    }

    #[test]
    fn appends_in_order() {
        let dir = tempdir().unwrap();
        let log = FileAuditLog::new(BuildLayout::new(dir.path()));
        let reference = BuildReference::new("app", 1);

        let first = AuditRecord::failed(&server(), Utc::now());
        let second = AuditRecord::pushed(&server(), 7, Utc::now());
        log.append(&reference, &first).unwrap();
        log.append(&reference, &second).unwrap();

        assert!(log.layout().audit_file(&reference).exists());
        assert_eq!(log.records(&reference).unwrap(), vec![first, second]);
        assert!(log
            .records(&BuildReference::new("app", 2))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let log = FileAuditLog::new(BuildLayout::new(dir.path()));
        let reference = BuildReference::new("app", 1);
        let path = log.layout().audit_file(&reference);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let err = log
            .append(&reference, &AuditRecord::failed(&server(), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Json(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }
}

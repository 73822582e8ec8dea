use crate::errors::{AppError, ResultExt};
use crate::table::WorkingTable;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// On-disk identity of the working table at load time.
///
/// Used to notice another writer (an upload, a spreadsheet editor) touching
/// the file between load and save. Modification time and size are checked
/// first; the SHA-256 checksum settles it when they differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
    /// SHA-256 checksum of the file bytes (hex encoded)
    pub checksum: String,
}

impl TableFingerprint {
    pub fn of_bytes(bytes: &[u8], modified: Option<SystemTime>) -> Self {
        Self {
            modified,
            len: bytes.len() as u64,
            checksum: compute_checksum(bytes),
        }
    }

    /// Returns true if the file at `path` still holds what we loaded.
    pub fn matches_disk(&self, path: &Path) -> Result<bool, AppError> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if metadata.len() == self.len && metadata.modified().ok() == self.modified {
            return Ok(true);
        }

        let bytes = fs::read(path)?;
        let unchanged = compute_checksum(&bytes) == self.checksum;
        if !unchanged {
            tracing::warn!(
                "Working table checksum mismatch. Expected: {}, on disk length: {}",
                self.checksum,
                bytes.len()
            );
        }
        Ok(unchanged)
    }
}

/// Computes SHA-256 checksum of the data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A loaded working table plus the fingerprint needed to save it back safely.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: WorkingTable,
    pub fingerprint: TableFingerprint,
}

/// File storage for the working table and its backups.
#[derive(Debug, Clone)]
pub struct TableStorage {
    path: PathBuf,
    output_dir: PathBuf,
    entity: String,
}

impl TableStorage {
    pub fn new(path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, entity: &str) -> Self {
        Self {
            path: path.into(),
            output_dir: output_dir.into(),
            entity: entity.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn load(&self) -> Result<LoadedTable, AppError> {
        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read working table {}", self.path.display()))?;
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok();

        let table = parse_csv(&bytes)
            .with_context(|| format!("Failed to parse working table {}", self.path.display()))?;

        tracing::info!(
            "Loaded {} rows, {} columns from {}",
            table.len(),
            table.headers().len(),
            self.path.display()
        );

        Ok(LoadedTable {
            table,
            fingerprint: TableFingerprint::of_bytes(&bytes, modified),
        })
    }

    /// Backup file name for a save at `at`: `backup_<entity>_<YYYYMMDD_HHMMSS>.csv`.
    pub fn backup_path(&self, at: DateTime<Local>) -> PathBuf {
        self.output_dir.join(format!(
            "backup_{}_{}.csv",
            self.entity,
            at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Writes one timestamped backup, then overwrites the working table.
    ///
    /// The backup goes first so a failed save never leaves the working table
    /// replaced without a backup next to it. If the working table changed on
    /// disk since `loaded_as` was taken, only the backup is written and
    /// `Conflict` is returned naming it.
    pub fn save_with_backup(
        &self,
        table: &WorkingTable,
        loaded_as: &TableFingerprint,
        at: DateTime<Local>,
    ) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output folder {}",
                self.output_dir.display()
            )
        })?;

        let bytes = encode_csv(table)?;
        let backup = self.backup_path(at);
        let unchanged = loaded_as.matches_disk(&self.path)?;

        write_atomically(&backup, &bytes)
            .with_context(|| format!("Failed to write backup {}", backup.display()))?;
        tracing::info!("Backup saved to: {}", backup.display());

        if !unchanged {
            tracing::error!(
                "Working table {} changed since it was loaded; results written to {} only",
                self.path.display(),
                backup.display()
            );
            return Err(AppError::Conflict(format!(
                "{} was modified by another process during the batch; results were saved to {} instead",
                self.path.display(),
                backup.display()
            )));
        }

        write_atomically(&self.path, &bytes)
            .with_context(|| format!("Failed to write working table {}", self.path.display()))?;
        tracing::info!("Updated working table: {}", self.path.display());

        Ok(backup)
    }

    /// `load` on the blocking thread pool.
    pub async fn load_async(&self) -> Result<LoadedTable, AppError> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.load()).await?
    }

    /// `save_with_backup` on the blocking thread pool.
    pub async fn save_with_backup_async(
        &self,
        table: WorkingTable,
        loaded_as: TableFingerprint,
        at: DateTime<Local>,
    ) -> Result<PathBuf, AppError> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.save_with_backup(&table, &loaded_as, at))
            .await?
    }
}

/// Parses CSV bytes (optionally BOM-prefixed) into a working table.
pub fn parse_csv(bytes: &[u8]) -> Result<WorkingTable, AppError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::Storage("working table has no header row".to_string()));
    }

    if let Some(name) = WorkingTable::duplicate_header(&headers) {
        return Err(AppError::Storage(format!(
            "working table has more than one column named '{}'",
            name
        )));
    }

    let mut table = WorkingTable::new(headers);
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(str::to_string).collect())?;
    }

    Ok(table)
}

/// Encodes a working table as UTF-8 CSV with a BOM, for spreadsheet tools.
pub fn encode_csv(table: &WorkingTable) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::WriterBuilder::new().from_writer(UTF8_BOM.to_vec());

    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Storage(format!("Failed to flush CSV: {}", e)))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bom_is_stripped_on_parse() {
        let bytes = b"\xEF\xBB\xBFa,b\n1,2\n";
        let table = parse_csv(bytes).unwrap();
        assert_eq!(table.headers(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.get(0, "b"), Some("2"));
    }

    #[test]
    fn test_encode_starts_with_bom() {
        let table = parse_csv(b"a\n1\n").unwrap();
        let bytes = encode_csv(&table).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        assert_eq!(&bytes[3..], b"a\n1\n");
    }

    #[test]
    fn test_wide_record_is_rejected() {
        let result = parse_csv("שם פרטי,שם משפחה\nדנה,כהן,extra-note\n".as_bytes());
        assert!(matches!(result, Err(AppError::Storage(msg)) if msg.contains("Row 2")));
    }

    #[test]
    fn test_trailing_empty_fields_round_trip() {
        let table = parse_csv(b"a,b\n1,2,,\n").unwrap();
        let bytes = encode_csv(&table).unwrap();
        assert_eq!(&bytes[3..], b"a,b\n1,2\n");
    }

    #[test]
    fn test_duplicate_headers_are_rejected() {
        let result = parse_csv("שם פרטי,נייד,נייד\nדנה,050-1,050-2\n".as_bytes());
        assert!(matches!(result, Err(AppError::Storage(msg)) if msg.contains("נייד")));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(parse_csv(b"").is_err());
    }

    #[test]
    fn test_checksum_consistency() {
        let a = TableFingerprint::of_bytes(b"same", None);
        let b = TableFingerprint::of_bytes(b"same", None);
        let c = TableFingerprint::of_bytes(b"other", None);

        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    fn test_backup_name_format() {
        let storage = TableStorage::new("list.csv", "output", "reporters");
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();

        assert_eq!(
            storage.backup_path(at),
            PathBuf::from("output/backup_reporters_20260309_140507.csv")
        );
    }
}

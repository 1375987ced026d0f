//! Transcript history persistence.
//!
//! Two backends, picked at configuration time: an atomic XML appender
//! (single `transcripts.xml`, temp-file + rename) and a SQLite store.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::domain::TranscriptionResult;
use crate::error::{Result, SottoError};

/// One persisted transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub filename: String,
    pub file_path: String,
    pub transcript: String,
    pub engine: String,
    pub model: String,
    pub language: String,
    pub duration_s: f64,
    pub refined: bool,
    /// ISO 8601 UTC
    pub created_at: String,
    pub file_size_mb: f64,
}

impl HistoryRecord {
    pub fn from_result(result: &TranscriptionResult, source: Option<&Path>) -> Self {
        let (filename, file_path, file_size_mb) = match source {
            Some(path) => (
                path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                path.display().to_string(),
                std::fs::metadata(path)
                    .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                    .unwrap_or(0.0),
            ),
            None => (String::new(), String::new(), 0.0),
        };
        Self {
            filename,
            file_path,
            transcript: result.text.clone(),
            engine: result.engine.clone(),
            model: result.model_name.clone(),
            language: result
                .segments
                .first()
                .and_then(|s| s.language.clone())
                .unwrap_or_else(|| "en".to_string()),
            duration_s: result.duration_s,
            refined: result.segments.iter().any(|s| s.refined_text.is_some()),
            created_at: Utc::now().to_rfc3339(),
            file_size_mb,
        }
    }
}

/// Storage backend for transcript history.
pub trait HistoryStorage: Send {
    fn append(&self, record: &HistoryRecord) -> Result<()>;
}

fn storage_error(context: &str, err: impl std::fmt::Display) -> SottoError {
    SottoError::Io(std::io::Error::other(format!("{}: {}", context, err)))
}

/// Single-file XML appender: `transcripts.xml` with a `<transcripts>`
/// root and one `<t>` element per entry. Writes go to a sibling temp
/// file which is renamed over the target, so readers never observe a
/// half-written document.
pub struct XmlHistory {
    target: PathBuf,
}

impl XmlHistory {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            target: base_dir.into().join("transcripts.xml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    fn render_entry<W: std::io::Write>(
        writer: &mut quick_xml::Writer<W>,
        record: &HistoryRecord,
    ) -> Result<()> {
        use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

        let mut elem = BytesStart::new("t");
        elem.push_attribute(("at", record.created_at.as_str()));
        elem.push_attribute(("engine", record.engine.as_str()));
        elem.push_attribute(("model", record.model.as_str()));
        elem.push_attribute(("lang", record.language.as_str()));
        elem.push_attribute(("dur_s", format!("{:.2}", record.duration_s).as_str()));

        writer
            .write_event(Event::Start(elem))
            .and_then(|_| writer.write_event(Event::Text(BytesText::new(&record.transcript))))
            .and_then(|_| writer.write_event(Event::End(BytesEnd::new("t"))))
            .map_err(|e| storage_error("XML write failed", e))
    }
}

impl HistoryStorage for XmlHistory {
    fn append(&self, record: &HistoryRecord) -> Result<()> {
        use quick_xml::Reader;
        use quick_xml::Writer;
        use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

        let dir = self
            .target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let mut buffer = Vec::new();
        let mut writer = Writer::new(std::io::Cursor::new(&mut buffer));

        if self.target.exists() {
            // Stream-copy the existing document, inserting the new entry
            // just before the closing root tag.
            let existing = std::fs::read_to_string(&self.target)?;
            let mut reader = Reader::from_str(&existing);
            loop {
                match reader.read_event() {
                    Ok(Event::Eof) => break,
                    Ok(Event::End(end)) if end.name().as_ref() == b"transcripts" => {
                        Self::render_entry(&mut writer, record)?;
                        writer
                            .write_event(Event::End(end))
                            .map_err(|e| storage_error("XML write failed", e))?;
                    }
                    Ok(event) => {
                        writer
                            .write_event(event)
                            .map_err(|e| storage_error("XML write failed", e))?;
                    }
                    Err(e) => return Err(storage_error("transcripts.xml is corrupt", e)),
                }
            }
        } else {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
                .and_then(|_| writer.write_event(Event::Start(BytesStart::new("transcripts"))))
                .map_err(|e| storage_error("XML write failed", e))?;
            Self::render_entry(&mut writer, record)?;
            writer
                .write_event(Event::End(BytesEnd::new("transcripts")))
                .map_err(|e| storage_error("XML write failed", e))?;
        }

        // Atomic replace: temp file in the same directory, then rename.
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        std::fs::write(tmp.path(), &buffer)?;
        tmp.persist(&self.target)
            .map_err(|e| storage_error("atomic rename failed", e))?;
        Ok(())
    }
}

/// SQLite-backed history store.
pub struct SqliteHistory {
    db_path: PathBuf,
}

impl SqliteHistory {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn open(&self) -> Result<rusqlite::Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(&self.db_path)
            .map_err(|e| storage_error("SQLite open failed", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transcripts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                file_path TEXT NOT NULL,
                transcript TEXT NOT NULL,
                engine TEXT NOT NULL,
                language TEXT,
                duration_seconds REAL,
                refined INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                file_size_mb REAL
            );
            CREATE INDEX IF NOT EXISTS idx_transcripts_created_at
                ON transcripts(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_transcripts_filename
                ON transcripts(filename);",
        )
        .map_err(|e| storage_error("SQLite schema setup failed", e))?;
        Ok(conn)
    }

    /// Most recent transcripts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT filename, file_path, transcript, engine, language,
                        duration_seconds, refined, created_at, file_size_mb
                 FROM transcripts ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(|e| storage_error("SQLite query failed", e))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(HistoryRecord {
                    filename: row.get(0)?,
                    file_path: row.get(1)?,
                    transcript: row.get(2)?,
                    engine: row.get(3)?,
                    model: String::new(),
                    language: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    duration_s: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                    refined: row.get::<_, i64>(6)? != 0,
                    created_at: row.get(7)?,
                    file_size_mb: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                })
            })
            .map_err(|e| storage_error("SQLite query failed", e))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| storage_error("SQLite row read failed", e))
    }
}

impl HistoryStorage for SqliteHistory {
    fn append(&self, record: &HistoryRecord) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO transcripts
                (filename, file_path, transcript, engine, language,
                 duration_seconds, refined, created_at, file_size_mb)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.filename,
                record.file_path,
                record.transcript,
                record.engine,
                record.language,
                record.duration_s,
                record.refined as i64,
                record.created_at,
                record.file_size_mb,
            ],
        )
        .map_err(|e| storage_error("SQLite insert failed", e))?;
        Ok(())
    }
}

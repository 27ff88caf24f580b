//! Crash-recovery snapshot of the client session registry.
//!
//! The snapshot is a single JSON array of [`ClientSession`] objects. Saving
//! goes through a temporary file in the same directory that is renamed over
//! the target, so a crash mid-write never leaves a truncated file as the
//! only copy. Loading streams the array and keeps every record it can read:
//! broken records are counted and reported, not fatal.

use crate::clients::client_session::ClientSession;
use crate::clients::registry::ClientSessionRegistry;
use crate::error_handling::types::SnapshotError;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::de::{DeserializeSeed, SeqAccess, Visitor};
use serde::Deserializer;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Outcome of [`load_from`].
///
/// `sessions` holds everything that was recovered even when `error` is set.
#[derive(Debug, Default)]
pub struct SnapshotLoad {
    pub sessions: Vec<ClientSession>,
    /// Records that parsed but were already obsolete.
    pub discarded: usize,
    pub error: Option<SnapshotError>,
}

/// Writes every session of `registry` to `path`, replacing it atomically.
///
/// The registry lock is only held while copying the sessions.
pub fn save_all(registry: &ClientSessionRegistry, path: &Path) -> Result<usize, SnapshotError> {
    let sessions = registry.snapshot();
    write_sessions(&sessions, path)?;
    debug!("Saved {} client session(s) to {}", sessions.len(), path.display());
    Ok(sessions.len())
}

fn write_sessions(sessions: &[ClientSession], path: &Path) -> Result<(), SnapshotError> {
    let io_err = |source: std::io::Error| {
        error!("Failed to write client snapshot {}: {}", path.display(), source);
        SnapshotError::IoError {
            path: path.to_path_buf(),
            source,
        }
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, sessions)
            .map_err(|e| SnapshotError::Serialize(e.to_string()))?;
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Reads the sessions stored at `path`.
///
/// A record is kept if it was connected when the snapshot was taken or if
/// its own `disconnected` timestamp is within `expiration` (`None` keeps
/// everything). Records that were connected are stamped as disconnected at
/// load time. A missing file is an empty, successful load.
pub fn load_from(path: &Path, expiration: Option<Duration>) -> SnapshotLoad {
    load_from_at(path, expiration, Utc::now())
}

pub(crate) fn load_from_at(path: &Path, expiration: Option<Duration>, now: DateTime<Utc>) -> SnapshotLoad {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No client snapshot at {}, starting empty", path.display());
            return SnapshotLoad::default();
        }
        Err(source) => {
            return SnapshotLoad {
                error: Some(SnapshotError::IoError {
                    path: path.to_path_buf(),
                    source,
                }),
                ..Default::default()
            }
        }
    };

    let mut load = SnapshotLoad::default();
    let mut rejected = RejectedRecords::default();
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
    let seed = SessionSink {
        expiration,
        now,
        load: &mut load,
        rejected: &mut rejected,
    };
    // Trailing data after the array counts as damage too.
    let stream_error = seed.deserialize(&mut de).and_then(|()| de.end()).err();

    load.error = match (stream_error, rejected.first) {
        (Some(e), _) => {
            warn!(
                "Client snapshot {} is damaged after {} record(s): {}",
                path.display(),
                load.sessions.len(),
                e
            );
            Some(SnapshotError::Malformed(e.to_string()))
        }
        (None, Some(first)) => Some(SnapshotError::Records {
            failed: rejected.count,
            first,
        }),
        (None, None) => None,
    };
    debug!(
        "Loaded {} client session(s) from {}, {} obsolete discarded",
        load.sessions.len(),
        path.display(),
        load.discarded
    );
    load
}

#[derive(Default)]
struct RejectedRecords {
    count: usize,
    first: Option<String>,
}

// Collects into borrowed buffers so records read before a syntax error
// survive the failed deserialization.
struct SessionSink<'a> {
    expiration: Option<Duration>,
    now: DateTime<Utc>,
    load: &'a mut SnapshotLoad,
    rejected: &'a mut RejectedRecords,
}

impl SessionSink<'_> {
    fn accept(&mut self, mut session: ClientSession) {
        if session.obsolete_at(self.expiration, self.now) {
            self.load.discarded += 1;
            return;
        }
        if session.disconnected.is_none() {
            session.disconnected = Some(self.now);
        }
        self.load.sessions.push(session);
    }
}

impl<'de> DeserializeSeed<'de> for SessionSink<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for SessionSink<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of client sessions")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            match serde_json::from_value::<ClientSession>(value) {
                Ok(session) => self.accept(session),
                Err(e) => {
                    self.rejected.count += 1;
                    if self.rejected.first.is_none() {
                        self.rejected.first = Some(e.to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

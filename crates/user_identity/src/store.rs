use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IdentityError;
use crate::paths::{identity_file, identity_root};
use crate::schema::IdentityRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStore {
    path: PathBuf,
    record: IdentityRecord,
}

impl IdentityStore {
    /// Loads the identity from the default location, creating it on first use.
    pub fn load_default() -> Result<Self, IdentityError> {
        let root = identity_root().ok_or(IdentityError::NoHomeDirectory)?;
        Self::load_or_create(&identity_file(&root))
    }

    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        match Self::open(path) {
            Ok(store) => Ok(store),
            Err(IdentityError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Self::create_new(path)
            }
            Err(error) => Err(error),
        }
    }

    pub fn open(path: &Path) -> Result<Self, IdentityError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| IdentityError::io("reading identity file", path, source))?;
        let record: IdentityRecord =
            serde_json::from_str(&raw).map_err(|source| IdentityError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        validate_record(path, &record)?;

        debug!(path = %path.display(), "loaded user identity");
        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    /// Writes a fresh identity. When another process created the file first,
    /// that identity is loaded instead.
    pub fn create_new(path: &Path) -> Result<Self, IdentityError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                IdentityError::io("creating identity directory", parent, source)
            })?;
        }

        let record = IdentityRecord::v1(Uuid::new_v4().to_string(), now_rfc3339()?);
        let mut body =
            serde_json::to_vec_pretty(&record).map_err(|source| IdentityError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        body.push(b'\n');

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(source) if source.kind() == ErrorKind::AlreadyExists => return Self::open(path),
            Err(source) => {
                return Err(IdentityError::io("creating identity file", path, source));
            }
        };
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .map_err(|source| IdentityError::io("writing identity file", path, source))?;

        info!(path = %path.display(), "created user identity");
        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn record(&self) -> &IdentityRecord {
        &self.record
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.record.user_id
    }
}

fn validate_record(path: &Path, record: &IdentityRecord) -> Result<(), IdentityError> {
    if record.version != 1 {
        return Err(IdentityError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: record.version,
        });
    }

    if record.user_id.trim().is_empty() {
        return Err(IdentityError::EmptyUserId {
            path: path.to_path_buf(),
        });
    }

    if OffsetDateTime::parse(&record.created_at, &Rfc3339).is_err() {
        return Err(IdentityError::InvalidTimestamp {
            path: path.to_path_buf(),
            value: record.created_at.clone(),
        });
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, IdentityError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(IdentityError::ClockFormat)
}

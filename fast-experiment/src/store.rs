use crate::error::PersistError;
use crate::results::ResultRecord;
use log::info;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Persistence collaborator: where the participant id comes from and where
/// finished sessions go.
pub trait ResultStore {
    fn participant_id(&self) -> Result<u32, PersistError>;
    fn save(&mut self, record: &ResultRecord, filename: &str) -> Result<PathBuf, PersistError>;
}

/// Pretty JSON files in one results directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub const PARTICIPANT_FILE: &'static str = "participant_id";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
        move |source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Writes the id the next session will pick up.
    pub fn store_participant_id(&self, id: u32) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;
        let path = self.dir.join(Self::PARTICIPANT_FILE);
        fs::write(&path, id.to_string()).map_err(Self::io_error(&path))
    }
}

impl ResultStore for JsonFileStore {
    fn participant_id(&self) -> Result<u32, PersistError> {
        let path = self.dir.join(Self::PARTICIPANT_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::MissingParticipant(path));
            }
            Err(e) => return Err(Self::io_error(&path)(e)),
        };
        let trimmed = raw.trim();
        match trimmed.parse::<u32>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(PersistError::InvalidParticipant(trimmed.to_string())),
        }
    }

    fn save(&mut self, record: &ResultRecord, filename: &str) -> Result<PathBuf, PersistError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;
        let path = self.dir.join(filename);
        let file = File::create(&path).map_err(Self::io_error(&path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush().map_err(Self::io_error(&path))?;
        info!("saved {} trials to {}", record.trials.len(), path.display());
        Ok(path)
    }
}

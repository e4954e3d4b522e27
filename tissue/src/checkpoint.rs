//! Atomic snapshots of the solution state.
//!
//! A checkpoint file starts with a magic tag and a format version followed by the bincode
//! encoded [`State`]. Files are written to a sibling temporary file which is synced and renamed
//! over the target, so a crash never leaves a partially written checkpoint behind.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fem::state::State;

const MAGIC: [u8; 8] = *b"TISSUECP";
const VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode or decode checkpoint: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("Not a checkpoint file")]
    BadMagic,
    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("Checkpoint holds {found} DOFs but the problem has {expected}")]
    DofMismatch { expected: usize, found: usize },
    #[error("Checkpoint vectors have inconsistent lengths ({u}, {v}, {a})")]
    Inconsistent { u: usize, v: usize, a: usize },
    #[error("Checkpoint is at step {found} but step {expected} was requested")]
    StepMismatch { expected: u64, found: u64 },
}

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 8],
    version: u32,
}

/// Location of a checkpoint file.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Writes `state` atomically. A failed attempt is retried once before the error is reported.
    pub fn save(&self, state: &State) -> Result<(), CheckpointError> {
        match self.try_save(state) {
            Ok(()) => {}
            Err(err) => {
                log::warn!("Checkpoint save failed, retrying: {}", err);
                self.try_save(state)?;
            }
        }
        log::debug!(
            "Saved checkpoint at step {} to {:?}",
            state.step,
            self.path
        );
        Ok(())
    }

    fn try_save(&self, state: &State) -> Result<(), CheckpointError> {
        let tmp = self.temp_path();
        let result = (|| {
            let file = File::create(&tmp).map_err(|e| self.io_error(e))?;
            let mut writer = BufWriter::new(file);
            let header = Header {
                magic: MAGIC,
                version: VERSION,
            };
            bincode::serialize_into(&mut writer, &header)?;
            bincode::serialize_into(&mut writer, state)?;
            writer.flush().map_err(|e| self.io_error(e))?;
            let file = writer
                .into_inner()
                .map_err(|e| self.io_error(e.into_error()))?;
            file.sync_all().map_err(|e| self.io_error(e))?;
            std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }

    /// Reads the stored state, checking the header and that it holds `expected_dofs` DOFs.
    pub fn load(&self, expected_dofs: usize) -> Result<State, CheckpointError> {
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::new(file);
        let header: Header =
            bincode::deserialize_from(&mut reader).map_err(|_| CheckpointError::BadMagic)?;
        if header.magic != MAGIC {
            return Err(CheckpointError::BadMagic);
        }
        if header.version != VERSION {
            return Err(CheckpointError::Version {
                found: header.version,
                expected: VERSION,
            });
        }
        let state: State = bincode::deserialize_from(&mut reader)?;
        let (u, v, a) = (state.u.len(), state.v.len(), state.a.len());
        if u != v || u != a {
            return Err(CheckpointError::Inconsistent { u, v, a });
        }
        if u != expected_dofs {
            return Err(CheckpointError::DofMismatch {
                expected: expected_dofs,
                found: u,
            });
        }
        Ok(state)
    }

    /// Like [`load`](Self::load), additionally requiring the stored step to be `resume_step`
    /// when given.
    pub fn load_at(
        &self,
        expected_dofs: usize,
        resume_step: Option<u64>,
    ) -> Result<State, CheckpointError> {
        let state = self.load(expected_dofs)?;
        match resume_step {
            Some(expected) if expected != state.step => Err(CheckpointError::StepMismatch {
                expected,
                found: state.step,
            }),
            _ => Ok(state),
        }
    }
}

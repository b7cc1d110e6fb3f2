//! Persistence of trained stacks.
//!
//! File layout: magic `SDAM`, big-endian `u32` format version, then the
//! stack encoded with bincode and compressed with gzip.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::info;

use crate::config::TrainingConfig;
use crate::engine::layer::stack::StackedDenoisingAutoencoder;
use crate::error::{Result, SdaError};

const MAGIC: &[u8; 4] = b"SDAM";
const FORMAT_VERSION: u32 = 1;

/// Directory of trained models, keyed by dataset and hyperparameters.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/trained_variables_<dataset><parameters_name>.dat`
    ///
    /// Only the fields in [`TrainingConfig::parameters_name`] and the hidden
    /// sizes are part of the key. `corruption_level`, `seed`, `patch_height`,
    /// `lr_adjust_interval` and `plateau_threshold` are not, so configurations
    /// differing only in those share one file.
    pub fn model_path(
        &self,
        dataset_name: &str,
        training: &TrainingConfig,
        hidden_layer_sizes: &[usize],
        patch_width: usize,
    ) -> PathBuf {
        self.root.join(format!(
            "trained_variables_{}{}.dat",
            dataset_name,
            training.parameters_name(hidden_layer_sizes, patch_width)
        ))
    }

    /// Whether a model exists at `path`. This is the only check deciding
    /// whether training can be skipped.
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn save(&self, stack: &StackedDenoisingAutoencoder, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        write_model(&mut writer, stack)?;
        writer.flush()?;
        info!("saved model to {}", path.display());
        Ok(())
    }

    pub fn load(&self, path: &Path) -> Result<StackedDenoisingAutoencoder> {
        let mut reader = BufReader::new(File::open(path)?);
        let stack = read_model(&mut reader)?;
        info!("loaded model from {}", path.display());
        Ok(stack)
    }
}

pub fn write_model<W: Write>(writer: &mut W, stack: &StackedDenoisingAutoencoder) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u32::<BigEndian>(FORMAT_VERSION)?;
    let mut encoder = GzEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, stack)?;
    encoder.finish()?;
    Ok(())
}

/// Reads and validates a stack written by [`write_model`].
pub fn read_model<R: Read>(reader: &mut R) -> Result<StackedDenoisingAutoencoder> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SdaError::InvalidModel(
            "Invalid magic number for model file".to_string(),
        ));
    }
    let version = reader.read_u32::<BigEndian>()?;
    if version != FORMAT_VERSION {
        return Err(SdaError::InvalidModel(format!(
            "unsupported model format version {}",
            version
        )));
    }
    let decoder = GzDecoder::new(reader);
    let stack: StackedDenoisingAutoencoder = bincode::deserialize_from(decoder)?;
    stack.validate()?;
    Ok(stack)
}

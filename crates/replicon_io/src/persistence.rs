//! Checkpoint files.
//!
//! Populations are saved as gzip-compressed JSON; single genomes can also
//! be archived with `rkyv`. Only instruction sequences are persisted, never
//! site flags or hardware state.

use crate::error::{IoError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use replicon_data::Sequence;
use rkyv::de::deserializers::SharedDeserializeMap;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One living organism in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub cell: usize,
    pub id: u64,
    pub genome: Sequence,
    pub generation: u32,
    pub merit: f64,
}

/// Population snapshot taken between updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationCheckpoint {
    pub update: u64,
    /// Name of the instruction set the genomes are encoded in.
    pub inst_set: String,
    /// `AppConfig::fingerprint` of the run that wrote the checkpoint.
    pub fingerprint: String,
    pub organisms: Vec<CheckpointEntry>,
}

impl PopulationCheckpoint {
    #[must_use]
    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }
}

pub fn save_checkpoint<P: AsRef<Path>>(checkpoint: &PopulationCheckpoint, path: P) -> Result<()> {
    let file = File::create(&path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("creating checkpoint {:?}", path.as_ref()))
    })?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, checkpoint)?;
    encoder.finish()?.flush()?;
    tracing::info!(
        update = checkpoint.update,
        organisms = checkpoint.len(),
        path = ?path.as_ref(),
        "Checkpoint saved"
    );
    Ok(())
}

pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<PopulationCheckpoint> {
    let file = File::open(&path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("opening checkpoint {:?}", path.as_ref()))
    })?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let checkpoint = serde_json::from_reader(decoder)
        .map_err(|e| IoError::Json(e).with_context(format!("decoding {:?}", path.as_ref())))?;
    Ok(checkpoint)
}

pub fn save_rkyv<T, P>(data: &T, path: P) -> Result<()>
where
    T: RkyvSerialize<AllocSerializer<4096>>,
    T: Archive,
    P: AsRef<Path>,
{
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(data)
        .map_err(|e| IoError::rkyv(format!("serialization failed: {:?}", e)))?;
    let bytes = serializer.into_serializer().into_inner();
    std::fs::write(&path, &bytes).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("writing archive {:?}", path.as_ref()))
    })?;
    Ok(())
}

pub fn load_rkyv<T, P>(path: P) -> Result<T>
where
    T: Archive,
    T::Archived: RkyvDeserialize<T, SharedDeserializeMap>
        + for<'a> rkyv::CheckBytes<rkyv::validation::validators::DefaultValidator<'a>>,
    P: AsRef<Path>,
{
    let bytes = std::fs::read(&path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("reading archive {:?}", path.as_ref()))
    })?;
    let archived = rkyv::check_archived_root::<T>(&bytes)
        .map_err(|e| IoError::rkyv(format!("validation failed: {:?}", e)))?;
    let mut deserializer = SharedDeserializeMap::default();
    archived
        .deserialize(&mut deserializer)
        .map_err(|e| IoError::rkyv(format!("deserialization failed: {:?}", e)))
}

/// Archives one genome.
pub fn save_genome_archive<P: AsRef<Path>>(genome: &Sequence, path: P) -> Result<()> {
    save_rkyv(genome, path)
}

pub fn load_genome_archive<P: AsRef<Path>>(path: P) -> Result<Sequence> {
    load_rkyv::<Sequence, _>(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> PopulationCheckpoint {
        PopulationCheckpoint {
            update: 12,
            inst_set: "heads_default".to_string(),
            fingerprint: "abc123".to_string(),
            organisms: vec![
                CheckpointEntry {
                    cell: 0,
                    id: 1,
                    genome: Sequence::from_symbols("wcczvfcaxgab").unwrap(),
                    generation: 3,
                    merit: 11.0,
                },
                CheckpointEntry {
                    cell: 7,
                    id: 9,
                    genome: Sequence::from_symbols("wczvfcaxgab").unwrap(),
                    generation: 4,
                    merit: 10.0,
                },
            ],
        }
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.json.gz");
        let original = checkpoint();
        save_checkpoint(&original, &path).unwrap();
        assert_eq!(load_checkpoint(&path).unwrap(), original);
    }

    #[test]
    fn test_checkpoint_is_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.json.gz");
        save_checkpoint(&checkpoint(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_plain_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.json");
        std::fs::write(&path, serde_json::to_string(&checkpoint()).unwrap()).unwrap();
        assert!(load_checkpoint(&path).is_err());
    }

    #[test]
    fn test_genome_archive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.rkyv");
        let genome = Sequence::from_symbols("wcczvfcaxgab").unwrap();
        save_genome_archive(&genome, &path).unwrap();
        assert_eq!(load_genome_archive(&path).unwrap(), genome);
    }

    #[test]
    fn test_corrupt_archive_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.rkyv");
        std::fs::write(&path, [0xffu8; 3]).unwrap();
        assert!(matches!(
            load_genome_archive(&path),
            Err(IoError::Rkyv(_))
        ));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! On-disk persistence for consolidated tensors and intermediate series.
//!
//! An archive starts with an eight byte magic and a mode byte, followed by a
//! bincode header (labels, axis coordinates, shape) and the array values as
//! little-endian `f64` in `(snapshot, x, y, z, variable)` row-major order.
//! In [`ArchiveMode::Compact`] everything after the mode byte is a gzip
//! stream; [`ArchiveMode::Fast`] writes it as is. Readers never need to know
//! which mode produced a file.

use crate::coords::{CoordinateIndex, SpatialAxis};
use crate::error::{FieldError, FieldResult};
use crate::observability::emit_field_op;
use crate::series::VariableSeries;
use crate::tensor::{ConsolidatedTensor, LabelMap};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array4, Array5};
use serde::{Deserialize, Serialize};
use spiral_config::ArchiveModeSetting;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

const ARCHIVE_MAGIC: &[u8; 8] = b"STFIELD\0";
const FORMAT_VERSION: u32 = 1;
const CHUNK_VALUES: usize = 1 << 14;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Physical representation of an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveMode {
    /// Uncompressed; load cost is a linear copy.
    Fast,
    /// Lossless deflate compression of the whole body.
    Compact,
}

impl ArchiveMode {
    fn tag(self) -> u8 {
        match self {
            ArchiveMode::Fast => 0,
            ArchiveMode::Compact => 1,
        }
    }

    fn from_tag(tag: u8) -> FieldResult<Self> {
        match tag {
            0 => Ok(ArchiveMode::Fast),
            1 => Ok(ArchiveMode::Compact),
            other => Err(FieldError::MalformedArchive(format!(
                "unknown archive mode tag {other}"
            ))),
        }
    }
}

impl From<ArchiveModeSetting> for ArchiveMode {
    fn from(setting: ArchiveModeSetting) -> Self {
        match setting {
            ArchiveModeSetting::Fast => ArchiveMode::Fast,
            ArchiveModeSetting::Compact => ArchiveMode::Compact,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ArchiveHeader {
    version: u32,
    labels: Vec<String>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    shape: [u64; 5],
}

impl ArchiveHeader {
    fn from_tensor(tensor: &ConsolidatedTensor) -> Self {
        let coords = tensor.coords();
        ArchiveHeader {
            version: FORMAT_VERSION,
            labels: tensor.labels().as_slice().to_vec(),
            x: coords.axis(SpatialAxis::X).coords().to_vec(),
            y: coords.axis(SpatialAxis::Y).coords().to_vec(),
            z: coords.axis(SpatialAxis::Z).coords().to_vec(),
            shape: tensor.shape().map(|d| d as u64),
        }
    }

    fn dims(&self) -> FieldResult<[usize; 5]> {
        let mut dims = [0usize; 5];
        for (dst, &src) in dims.iter_mut().zip(self.shape.iter()) {
            *dst = usize::try_from(src)
                .map_err(|_| FieldError::MalformedArchive(format!("extent {src} overflows")))?;
        }
        Ok(dims)
    }

    /// Checks the declared extents against the header's own labels and axes,
    /// so a corrupted shape fails before any body allocation.
    fn validate(&self) -> FieldResult<()> {
        let [_, x, y, z, v] = self.dims()?;
        let declared = [
            ("x", self.x.len(), x),
            ("y", self.y.len(), y),
            ("z", self.z.len(), z),
            ("labels", self.labels.len(), v),
        ];
        for (name, stored, extent) in declared {
            if stored != extent {
                return Err(FieldError::MalformedArchive(format!(
                    "header lists {stored} {name} entries but declares extent {extent}"
                )));
            }
        }
        Ok(())
    }

    fn value_count(&self) -> FieldResult<usize> {
        self.dims()?
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| FieldError::MalformedArchive("array volume overflows".into()))
    }

    fn into_tensor(self, values: Vec<f64>) -> FieldResult<ConsolidatedTensor> {
        let [t, x, y, z, v] = self.dims()?;
        let coords = CoordinateIndex::new(self.x, self.y, self.z)?;
        if coords.shape() != [x, y, z] {
            return Err(FieldError::MalformedArchive(format!(
                "axis coordinates {:?} do not describe a {:?} grid",
                coords.shape(),
                [x, y, z]
            )));
        }
        let labels = LabelMap::new(self.labels)?;
        let data = Array5::from_shape_vec((t, x, y, z, v), values)
            .map_err(|err| FieldError::MalformedArchive(err.to_string()))?;
        ConsolidatedTensor::from_parts(data, labels, coords)
    }
}

fn write_body<W: Write>(tensor: &ConsolidatedTensor, writer: &mut W) -> FieldResult<()> {
    bincode::serialize_into(&mut *writer, &ArchiveHeader::from_tensor(tensor))?;
    let mut buffer = Vec::with_capacity(CHUNK_VALUES * 8);
    for value in tensor.data().iter() {
        buffer.extend_from_slice(&value.to_le_bytes());
        if buffer.len() == buffer.capacity() {
            writer.write_all(&buffer)?;
            buffer.clear();
        }
    }
    writer.write_all(&buffer)?;
    Ok(())
}

fn read_body<R: Read>(reader: &mut R) -> FieldResult<ConsolidatedTensor> {
    let header: ArchiveHeader = bincode::deserialize_from(&mut *reader)?;
    if header.version != FORMAT_VERSION {
        return Err(FieldError::MalformedArchive(format!(
            "unsupported format version {}",
            header.version
        )));
    }
    header.validate()?;
    let count = header.value_count()?;
    let mut values = Vec::with_capacity(count.min(CHUNK_VALUES));
    let mut bytes = vec![0u8; CHUNK_VALUES * 8];
    let mut remaining = count;
    while remaining > 0 {
        let take = remaining.min(CHUNK_VALUES);
        let chunk = &mut bytes[..take * 8];
        reader.read_exact(chunk)?;
        values.extend(chunk.chunks_exact(8).map(|raw| {
            let mut word = [0u8; 8];
            word.copy_from_slice(raw);
            f64::from_le_bytes(word)
        }));
        remaining -= take;
    }
    header.into_tensor(values)
}

/// Writes a complete archive to any sink.
pub fn encode<W: Write>(
    tensor: &ConsolidatedTensor,
    mut writer: W,
    mode: ArchiveMode,
    level: u32,
) -> FieldResult<W> {
    writer.write_all(ARCHIVE_MAGIC)?;
    writer.write_all(&[mode.tag()])?;
    match mode {
        ArchiveMode::Fast => {
            write_body(tensor, &mut writer)?;
            Ok(writer)
        }
        ArchiveMode::Compact => {
            let mut encoder = GzEncoder::new(writer, Compression::new(level.min(9)));
            write_body(tensor, &mut encoder)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Reads a complete archive from any source, reporting which mode wrote it.
pub fn decode<R: Read>(mut reader: R) -> FieldResult<(ConsolidatedTensor, ArchiveMode)> {
    let mode = read_preamble(&mut reader)?;
    let tensor = match mode {
        ArchiveMode::Fast => read_body(&mut reader)?,
        ArchiveMode::Compact => read_body(&mut GzDecoder::new(reader))?,
    };
    Ok((tensor, mode))
}

fn read_preamble<R: Read>(reader: &mut R) -> FieldResult<ArchiveMode> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != ARCHIVE_MAGIC {
        return Err(FieldError::MalformedArchive("missing archive magic".into()));
    }
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag)?;
    ArchiveMode::from_tag(tag[0])
}

fn create_file(path: &Path) -> FieldResult<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// Persists `tensor` at `path` with the default compression level.
pub fn save(tensor: &ConsolidatedTensor, path: &Path, mode: ArchiveMode) -> FieldResult<()> {
    save_with_level(tensor, path, mode, DEFAULT_COMPRESSION_LEVEL)
}

pub fn save_with_level(
    tensor: &ConsolidatedTensor,
    path: &Path,
    mode: ArchiveMode,
    level: u32,
) -> FieldResult<()> {
    let writer = BufWriter::new(create_file(path)?);
    let mut writer = encode(tensor, writer, mode, level)?;
    writer.flush()?;
    let bytes = fs::metadata(path)?.len();
    info!(path = %path.display(), ?mode, bytes, shape = ?tensor.shape(), "saved archive");
    emit_field_op("archive.save", &tensor.shape(), &[bytes as usize]);
    Ok(())
}

/// Loads an archive written in either mode.
pub fn load(path: &Path) -> FieldResult<ConsolidatedTensor> {
    load_with_mode(path).map(|(tensor, _)| tensor)
}

pub fn load_with_mode(path: &Path) -> FieldResult<(ConsolidatedTensor, ArchiveMode)> {
    let reader = BufReader::new(File::open(path)?);
    let (tensor, mode) = decode(reader)?;
    info!(path = %path.display(), ?mode, shape = ?tensor.shape(), "loaded archive");
    emit_field_op("archive.load", &[], &tensor.shape());
    Ok((tensor, mode))
}

/// Reads only the preamble to report which mode produced `path`.
pub fn probe_mode(path: &Path) -> FieldResult<ArchiveMode> {
    let mut reader = BufReader::new(File::open(path)?);
    read_preamble(&mut reader)
}

/// Loads `path`, re-encodes it in the same mode, decodes the re-encoded
/// bytes and compares both generations against `original`.
///
/// A mismatch surfaces as [`FieldError::Integrity`].
pub fn round_trip_equal(original: &ConsolidatedTensor, path: &Path) -> FieldResult<()> {
    let (loaded, mode) = load_with_mode(path)?;
    if let Some(err) = original.first_difference(&loaded) {
        return Err(err.into());
    }
    let bytes = encode(&loaded, Vec::new(), mode, DEFAULT_COMPRESSION_LEVEL)?;
    let (reloaded, _) = decode(bytes.as_slice())?;
    if let Some(err) = original.first_difference(&reloaded) {
        return Err(err.into());
    }
    debug!(path = %path.display(), ?mode, "round trip matched");
    Ok(())
}

/// Rewrites an archive in another mode. Returns the mode of the source.
pub fn recompress(
    input: &Path,
    output: &Path,
    mode: ArchiveMode,
    level: u32,
) -> FieldResult<ArchiveMode> {
    let (tensor, source_mode) = load_with_mode(input)?;
    save_with_level(&tensor, output, mode, level)?;
    Ok(source_mode)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredSeries {
    label: String,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    snapshots: usize,
    data: Vec<f64>,
}

impl StoredSeries {
    fn from_series(series: &VariableSeries) -> Self {
        let coords = series.coords();
        StoredSeries {
            label: series.label().to_string(),
            x: coords.axis(SpatialAxis::X).coords().to_vec(),
            y: coords.axis(SpatialAxis::Y).coords().to_vec(),
            z: coords.axis(SpatialAxis::Z).coords().to_vec(),
            snapshots: series.snapshot_count(),
            data: series.values().iter().copied().collect(),
        }
    }

    fn into_series(self) -> FieldResult<VariableSeries> {
        let coords = CoordinateIndex::new(self.x, self.y, self.z)?;
        let [nx, ny, nz] = coords.shape();
        let values = Array4::from_shape_vec((self.snapshots, nx, ny, nz), self.data)
            .map_err(|err| FieldError::MalformedArchive(err.to_string()))?;
        VariableSeries::new(self.label, values, coords)
    }
}

/// Persists a single variable series, the unit handed over by the parsers.
pub fn save_series(series: &VariableSeries, path: &Path) -> FieldResult<()> {
    let writer = BufWriter::new(create_file(path)?);
    bincode::serialize_into(writer, &StoredSeries::from_series(series))?;
    debug!(path = %path.display(), label = series.label(), "saved series");
    Ok(())
}

pub fn load_series(path: &Path) -> FieldResult<VariableSeries> {
    let reader = BufReader::new(File::open(path)?);
    let stored: StoredSeries = bincode::deserialize_from(reader)?;
    stored.into_series()
}

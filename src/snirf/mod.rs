//! SNIRF source container access.
//!
//! A SNIRF file is a hierarchical container with a fixed layout: a format
//! version string at the root, acquisition metadata under `/nirs/metaDataTags`,
//! probe geometry under `/nirs/probe`, and the measurement block under
//! `/nirs/data1` (raw time series, timestamps, and one `measurementList<N>`
//! group per channel).
//!
//! The container I/O itself lives behind the [`RecordSource`] trait: the
//! conversion core only ever asks for a typed value at one of the fixed paths
//! below. [`MemorySource`] is the in-memory implementation used by the test
//! suite; `Hdf5Source` (feature `snirf-hdf5`) reads real `.snirf` files.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2};

use crate::error::ConvertError;

#[cfg(feature = "snirf-hdf5")]
pub mod hdf5;

pub const FORMAT_VERSION: &str = "/formatVersion";
pub const META_TAGS: &str = "/nirs/metaDataTags";
pub const PROBE: &str = "/nirs/probe";
pub const DATA_BLOCK: &str = "/nirs/data1";

const MEASUREMENT_LIST_PREFIX: &str = "measurementList";

/// One typed value read out of the container.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Str(String),
    StrVec(Vec<String>),
    Int(i64),
    Float(f64),
    FloatVec(Vec<f64>),
    FloatMatrix(Array2<f64>),
}

impl RecordValue {
    fn type_name(&self) -> &'static str {
        match self {
            RecordValue::Str(_) => "string",
            RecordValue::StrVec(_) => "string array",
            RecordValue::Int(_) => "integer",
            RecordValue::Float(_) => "float",
            RecordValue::FloatVec(_) => "float array",
            RecordValue::FloatMatrix(_) => "float matrix",
        }
    }
}

/// Read-only access to one subject's source container.
pub trait RecordSource {
    /// Returns the typed value stored at a hierarchical path, or
    /// [`ConvertError::NotFound`] if the path is absent.
    fn read(&self, path: &str) -> Result<RecordValue, ConvertError>;

    /// Returns the names of the direct children of a group path.
    fn list(&self, path: &str) -> Result<Vec<String>, ConvertError>;
}

/// Raw per-channel entry from one `measurementList<N>` group.
///
/// All indices are 1-based, exactly as stored in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub list_index: usize,
    pub source_index: i64,
    pub detector_index: i64,
    pub wavelength_index: i64,
    pub data_type: i64,
    pub data_type_index: i64,
}

pub fn format_version(source: &dyn RecordSource) -> Result<String, ConvertError> {
    read_str(source, FORMAT_VERSION)
}

/// Reads one string tag under `/nirs/metaDataTags`.
pub fn meta_tag(source: &dyn RecordSource, tag: &str) -> Result<String, ConvertError> {
    read_str(source, &format!("{META_TAGS}/{tag}"))
}

pub fn source_labels(source: &dyn RecordSource) -> Result<Vec<String>, ConvertError> {
    read_str_vec(source, &format!("{PROBE}/sourceLabels"))
}

pub fn detector_labels(source: &dyn RecordSource) -> Result<Vec<String>, ConvertError> {
    read_str_vec(source, &format!("{PROBE}/detectorLabels"))
}

pub fn source_positions(source: &dyn RecordSource) -> Result<Array2<f64>, ConvertError> {
    read_matrix(source, &format!("{PROBE}/sourcePos3D"))
}

pub fn detector_positions(source: &dyn RecordSource) -> Result<Array2<f64>, ConvertError> {
    read_matrix(source, &format!("{PROBE}/detectorPos3D"))
}

/// The wavelength table shared by every channel in the session (nm).
pub fn wavelengths(source: &dyn RecordSource) -> Result<Vec<f64>, ConvertError> {
    read_float_vec(source, &format!("{PROBE}/wavelengths"))
}

/// The acquired measurement data, `[time x channel]`.
pub fn data_matrix(source: &dyn RecordSource) -> Result<Array2<f64>, ConvertError> {
    read_matrix(source, &format!("{DATA_BLOCK}/dataTimeSeries"))
}

/// Timestamps of the measurement data, seconds relative to session start.
pub fn timestamps(source: &dyn RecordSource) -> Result<Array1<f64>, ConvertError> {
    Ok(Array1::from_vec(read_float_vec(
        source,
        &format!("{DATA_BLOCK}/time"),
    )?))
}

/// Enumerates the `measurementList<N>` channel entries in numeric list order.
pub fn channel_entries(source: &dyn RecordSource) -> Result<Vec<ChannelEntry>, ConvertError> {
    let mut indices = Vec::new();
    for name in source.list(DATA_BLOCK)? {
        if let Some(suffix) = name.strip_prefix(MEASUREMENT_LIST_PREFIX) {
            let index: usize = suffix.parse().map_err(|_| {
                ConvertError::Schema(format!(
                    "measurement list group '{name}' has a non-numeric index"
                ))
            })?;
            indices.push(index);
        }
    }
    indices.sort_unstable();

    let mut entries = Vec::with_capacity(indices.len());
    for index in indices {
        let group = format!("{DATA_BLOCK}/{MEASUREMENT_LIST_PREFIX}{index}");
        entries.push(ChannelEntry {
            list_index: index,
            source_index: read_int(source, &format!("{group}/sourceIndex"))?,
            detector_index: read_int(source, &format!("{group}/detectorIndex"))?,
            wavelength_index: read_int(source, &format!("{group}/wavelengthIndex"))?,
            data_type: read_int(source, &format!("{group}/dataType"))?,
            data_type_index: read_int(source, &format!("{group}/dataTypeIndex"))?,
        });
    }
    Ok(entries)
}

fn read_str(source: &dyn RecordSource, path: &str) -> Result<String, ConvertError> {
    match source.read(path)? {
        RecordValue::Str(s) => Ok(s),
        other => Err(type_mismatch(path, "string", &other)),
    }
}

fn read_str_vec(source: &dyn RecordSource, path: &str) -> Result<Vec<String>, ConvertError> {
    match source.read(path)? {
        RecordValue::StrVec(v) => Ok(v),
        other => Err(type_mismatch(path, "string array", &other)),
    }
}

/// Integer records may come back as floats from numeric-only container
/// backends; integral floats are accepted.
fn read_int(source: &dyn RecordSource, path: &str) -> Result<i64, ConvertError> {
    match source.read(path)? {
        RecordValue::Int(v) => Ok(v),
        RecordValue::Float(v) if v.fract() == 0.0 => Ok(v as i64),
        other => Err(type_mismatch(path, "integer", &other)),
    }
}

fn read_float_vec(source: &dyn RecordSource, path: &str) -> Result<Vec<f64>, ConvertError> {
    match source.read(path)? {
        RecordValue::FloatVec(v) => Ok(v),
        RecordValue::Float(v) => Ok(vec![v]),
        other => Err(type_mismatch(path, "float array", &other)),
    }
}

fn read_matrix(source: &dyn RecordSource, path: &str) -> Result<Array2<f64>, ConvertError> {
    match source.read(path)? {
        RecordValue::FloatMatrix(m) => Ok(m),
        other => Err(type_mismatch(path, "float matrix", &other)),
    }
}

fn type_mismatch(path: &str, expected: &'static str, found: &RecordValue) -> ConvertError {
    ConvertError::TypeMismatch {
        path: format!("{path} (found {})", found.type_name()),
        expected,
    }
}

/// In-memory [`RecordSource`] over a path/value map.
///
/// Doubles as the reference for the addressing scheme: every path a real
/// container backend must answer is a key here.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: BTreeMap<String, RecordValue>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, value: RecordValue) -> &mut Self {
        self.records.insert(path.into(), value);
        self
    }

    pub fn remove(&mut self, path: &str) -> Option<RecordValue> {
        self.records.remove(path)
    }
}

impl RecordSource for MemorySource {
    fn read(&self, path: &str) -> Result<RecordValue, ConvertError> {
        self.records
            .get(path)
            .cloned()
            .ok_or_else(|| ConvertError::NotFound(path.to_string()))
    }

    fn list(&self, path: &str) -> Result<Vec<String>, ConvertError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let children: BTreeSet<String> = self
            .records
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        if children.is_empty() {
            return Err(ConvertError::NotFound(path.to_string()));
        }
        Ok(children.into_iter().collect())
    }
}

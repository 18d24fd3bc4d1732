//! HDF5-backed SNIRF reading (feature `snirf-hdf5`).
//!
//! SNIRF v1.x stores strings as either variable-length or fixed-length
//! UTF-8/ASCII datasets (h5py writes fixed-length by default) and all
//! numerics as floating point or integer scalars/arrays; both map directly
//! onto [`RecordValue`]. The HDF5 wire format itself is the `hdf5` crate's
//! concern, not ours.

use std::path::{Path, PathBuf};

use hdf5::File;
use hdf5::types::{FixedAscii, FixedUnicode, TypeDescriptor, VarLenAscii, VarLenUnicode};

use crate::error::ConvertError;
use crate::snirf::{RecordSource, RecordValue};

/// In-memory capacity for fixed-length string reads. Container strings are
/// labels, dates, and unit names; nothing legitimate comes close.
const FIXED_STR_CAPACITY: usize = 256;

/// One subject's `.snirf` file, addressed by hierarchical path.
pub struct Hdf5Source {
    file: File,
    path: PathBuf,
}

impl Hdf5Source {
    pub fn open(path: &Path) -> Result<Self, ConvertError> {
        let file = File::open(path).map_err(|e| {
            ConvertError::io(path, std::io::Error::other(e.to_string()))
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    fn schema_err(&self, path: &str, err: impl std::fmt::Display) -> ConvertError {
        ConvertError::Schema(format!("{}: {path}: {err}", self.path.display()))
    }

    fn read_varlen_string_dataset(
        &self,
        dataset: &hdf5::Dataset,
        path: &str,
        unicode: bool,
    ) -> Result<RecordValue, ConvertError> {
        match dataset.ndim() {
            0 => {
                let value = if unicode {
                    dataset
                        .read_scalar::<VarLenUnicode>()
                        .map(|s| s.to_string())
                } else {
                    dataset.read_scalar::<VarLenAscii>().map(|s| s.to_string())
                };
                Ok(RecordValue::Str(
                    value.map_err(|e| self.schema_err(path, e))?,
                ))
            }
            1 => {
                let values = if unicode {
                    dataset
                        .read_1d::<VarLenUnicode>()
                        .map(|a| a.iter().map(|s| s.to_string()).collect())
                } else {
                    dataset
                        .read_1d::<VarLenAscii>()
                        .map(|a| a.iter().map(|s| s.to_string()).collect())
                };
                Ok(RecordValue::StrVec(
                    values.map_err(|e| self.schema_err(path, e))?,
                ))
            }
            _ => Err(ConvertError::TypeMismatch {
                path: path.to_string(),
                expected: "string scalar or 1-D string array",
            }),
        }
    }

    /// Fixed-length strings are read through a fixed-capacity memory type;
    /// the HDF5 string conversion pads the stored value up to capacity.
    fn read_fixed_string_dataset(
        &self,
        dataset: &hdf5::Dataset,
        path: &str,
        stored_len: usize,
        unicode: bool,
    ) -> Result<RecordValue, ConvertError> {
        if stored_len > FIXED_STR_CAPACITY {
            return Err(self.schema_err(
                path,
                format!("fixed string length {stored_len} exceeds {FIXED_STR_CAPACITY}"),
            ));
        }
        match dataset.ndim() {
            0 => {
                let value = if unicode {
                    dataset
                        .read_scalar::<FixedUnicode<FIXED_STR_CAPACITY>>()
                        .map(|s| s.to_string())
                } else {
                    dataset
                        .read_scalar::<FixedAscii<FIXED_STR_CAPACITY>>()
                        .map(|s| s.to_string())
                };
                Ok(RecordValue::Str(
                    value.map_err(|e| self.schema_err(path, e))?,
                ))
            }
            1 => {
                let values = if unicode {
                    dataset
                        .read_1d::<FixedUnicode<FIXED_STR_CAPACITY>>()
                        .map(|a| a.iter().map(|s| s.to_string()).collect())
                } else {
                    dataset
                        .read_1d::<FixedAscii<FIXED_STR_CAPACITY>>()
                        .map(|a| a.iter().map(|s| s.to_string()).collect())
                };
                Ok(RecordValue::StrVec(
                    values.map_err(|e| self.schema_err(path, e))?,
                ))
            }
            _ => Err(ConvertError::TypeMismatch {
                path: path.to_string(),
                expected: "string scalar or 1-D string array",
            }),
        }
    }

    fn read_numeric_dataset(
        &self,
        dataset: &hdf5::Dataset,
        path: &str,
    ) -> Result<RecordValue, ConvertError> {
        match dataset.ndim() {
            0 => Ok(RecordValue::Float(
                dataset
                    .read_scalar::<f64>()
                    .map_err(|e| self.schema_err(path, e))?,
            )),
            1 => Ok(RecordValue::FloatVec(
                dataset
                    .read_1d::<f64>()
                    .map_err(|e| self.schema_err(path, e))?
                    .to_vec(),
            )),
            2 => Ok(RecordValue::FloatMatrix(
                dataset
                    .read_2d::<f64>()
                    .map_err(|e| self.schema_err(path, e))?,
            )),
            n => Err(ConvertError::TypeMismatch {
                path: format!("{path} ({n} dimensions)"),
                expected: "scalar, 1-D, or 2-D numeric array",
            }),
        }
    }
}

impl RecordSource for Hdf5Source {
    fn read(&self, path: &str) -> Result<RecordValue, ConvertError> {
        let name = path.trim_start_matches('/');
        let dataset = self
            .file
            .dataset(name)
            .map_err(|_| ConvertError::NotFound(path.to_string()))?;
        let descriptor = dataset
            .dtype()
            .and_then(|d| d.to_descriptor())
            .map_err(|e| self.schema_err(path, e))?;

        match descriptor {
            TypeDescriptor::VarLenUnicode => {
                self.read_varlen_string_dataset(&dataset, path, true)
            }
            TypeDescriptor::VarLenAscii => {
                self.read_varlen_string_dataset(&dataset, path, false)
            }
            TypeDescriptor::FixedUnicode(len) => {
                self.read_fixed_string_dataset(&dataset, path, len, true)
            }
            TypeDescriptor::FixedAscii(len) => {
                self.read_fixed_string_dataset(&dataset, path, len, false)
            }
            _ => self.read_numeric_dataset(&dataset, path),
        }
    }

    fn list(&self, path: &str) -> Result<Vec<String>, ConvertError> {
        let name = path.trim_start_matches('/');
        let group = self
            .file
            .group(name)
            .map_err(|_| ConvertError::NotFound(path.to_string()))?;
        group
            .member_names()
            .map_err(|e| self.schema_err(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn fixed_length_strings_read_back_without_padding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixed.snirf");
        {
            let file = File::create(&path).unwrap();
            let version = FixedAscii::<8>::from_ascii(b"1.0").unwrap();
            file.new_dataset::<FixedAscii<8>>()
                .create("formatVersion")
                .unwrap()
                .write_scalar(&version)
                .unwrap();

            let probe = file
                .create_group("nirs")
                .unwrap()
                .create_group("probe")
                .unwrap();
            let labels = arr1(&[
                FixedAscii::<8>::from_ascii(b"S1").unwrap(),
                FixedAscii::<8>::from_ascii(b"S2").unwrap(),
            ]);
            probe
                .new_dataset_builder()
                .with_data(&labels)
                .create("sourceLabels")
                .unwrap();
        }

        let source = Hdf5Source::open(&path).unwrap();
        assert_eq!(
            source.read("/formatVersion").unwrap(),
            RecordValue::Str("1.0".to_string())
        );
        assert_eq!(
            source.read("/nirs/probe/sourceLabels").unwrap(),
            RecordValue::StrVec(vec!["S1".to_string(), "S2".to_string()])
        );
    }

    #[test]
    fn varlen_strings_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("varlen.snirf");
        {
            let file = File::create(&path).unwrap();
            let version: VarLenUnicode = "1.0".parse().unwrap();
            file.new_dataset::<VarLenUnicode>()
                .create("formatVersion")
                .unwrap()
                .write_scalar(&version)
                .unwrap();
        }

        let source = Hdf5Source::open(&path).unwrap();
        assert_eq!(
            source.read("/formatVersion").unwrap(),
            RecordValue::Str("1.0".to_string())
        );
    }
}

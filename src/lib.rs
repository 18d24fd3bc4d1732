//! snirf2nwb - Convert BIDS-organized SNIRF fNIRS recordings to NWB record sets
//!
//! This crate converts a BIDS dataset of SNIRF (HDF5) continuous-wave fNIRS
//! recordings into one NWB-schema Zarr store per subject/session, ready for
//! archival upload.
//!
//! # Overview
//!
//! A conversion walks the dataset root, and for each `sub-NN` directory:
//!
//! 1. loads the four BIDS sidecar files (dataset description, coordinate
//!    system, task parameters, stimulus events),
//! 2. opens the `.snirf` container and validates its fixed-value fields
//!    (units of measurement, continuous-wave data-type codes),
//! 3. maps the container plus sidecars to a complete in-memory record set
//!    (subject, optode tables, channel table with physical wavelengths,
//!    raw time series, stimulus events),
//! 4. writes the record set as a Zarr-backend `.nwb` store.
//!
//! Subjects convert independently: a failure in one is reported and the batch
//! moves on, and the process exits non-zero if any subject failed.
//!
//! # Output layout
//!
//! ```text
//! <output_root>/
//! └── sub-01/
//!     └── sub-01_task-tapping_nirs.nwb/
//!         ├── subject/
//!         ├── acquisition/nirs_data/{data,timestamps}
//!         ├── channels/{source_index,detector_index,source_wavelength}
//!         ├── sources/positions
//!         ├── detectors/positions
//!         └── stimulus/{onset,duration}
//! ```
//!
//! # Usage
//!
//! ```bash
//! snirf2nwb /data/fnirs-tapping /data/fnirs-tapping-nwb
//! ```
//!
//! Reading real `.snirf` containers requires the `snirf-hdf5` feature (and
//! libhdf5 on the build host); the rest of the pipeline, including the
//! writer, is pure Rust.

pub mod bids;
pub mod cli;
pub mod driver;
pub mod error;
pub mod layout;
pub mod mapping;
pub mod nwb;
pub mod snirf;
pub mod validate;

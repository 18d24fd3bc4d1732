//! Serializes one [`MappedSession`] to a Zarr-backend NWB store.
//!
//! The store is written once per subject/session and never appended to:
//! every array is created with its final shape. Scalar and string-valued
//! metadata (session fields, subject record, channel/optode labels, trial
//! types) ride as JSON attributes on the owning group.
//!
//! Store layout:
//!
//! ```text
//! sub-01_task-tapping_nirs.nwb/
//! ├── zarr.json                  (session attributes)
//! ├── subject/                   (subject record attributes)
//! ├── acquisition/nirs_data/
//! │   ├── data                   [time x channels] float64
//! │   └── timestamps             [time] float64
//! ├── channels/                  (labels in attributes)
//! │   ├── source_index           [channels] uint64, 1-based
//! │   ├── detector_index         [channels] uint64, 1-based
//! │   └── source_wavelength      [channels] float64, nm
//! ├── sources/positions          [optodes x 3] float64 (labels in attributes)
//! ├── detectors/positions        [optodes x 3] float64 (labels in attributes)
//! └── stimulus/
//!     ├── onset                  [events] float64, seconds
//!     └── duration               [events] float64, seconds (trial types in attributes)
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ndarray::{Array1, Array2, Ix1, Ix2};
use serde_json::json;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::GroupBuilder;

use crate::nwb::{MappedSession, Optode, SubjectRecord};

/// Writes the record set to a fresh store at `store_path`.
///
/// An existing store at the path is replaced, so re-running a conversion with
/// unchanged inputs reproduces the same output.
pub fn write_session(session: &MappedSession, store_path: &Path) -> Result<()> {
    if store_path.exists() {
        std::fs::remove_dir_all(store_path)?;
    }
    std::fs::create_dir_all(store_path)?;
    let store = Arc::new(FilesystemStore::new(store_path)?);

    create_group(&store, "/", session_attributes(session))?;
    create_group(&store, "/subject", subject_attributes(&session.subject))?;

    create_group(&store, "/acquisition", serde_json::Map::new())?;
    let mut series_attrs = serde_json::Map::new();
    series_attrs.insert("description".into(), json!("The raw NIRS channel data"));
    series_attrs.insert("unit".into(), json!("V"));
    create_group(&store, "/acquisition/nirs_data", series_attrs)?;
    write_f64_2d(
        &store,
        "/acquisition/nirs_data/data",
        ["time", "channels"],
        &session.series.data,
    )?;
    write_f64_1d(
        &store,
        "/acquisition/nirs_data/timestamps",
        "time",
        &session.series.timestamps,
    )?;

    let mut channel_attrs = serde_json::Map::new();
    channel_attrs.insert(
        "labels".into(),
        json!(session.channels.iter().map(|c| &c.label).collect::<Vec<_>>()),
    );
    create_group(&store, "/channels", channel_attrs)?;
    write_u64_1d(
        &store,
        "/channels/source_index",
        "channels",
        session.channels.iter().map(|c| c.source_index as u64),
    )?;
    write_u64_1d(
        &store,
        "/channels/detector_index",
        "channels",
        session.channels.iter().map(|c| c.detector_index as u64),
    )?;
    write_f64_1d(
        &store,
        "/channels/source_wavelength",
        "channels",
        &Array1::from_iter(session.channels.iter().map(|c| c.source_wavelength)),
    )?;

    write_optode_table(&store, "/sources", &session.sources)?;
    write_optode_table(&store, "/detectors", &session.detectors)?;

    let mut stimulus_attrs = serde_json::Map::new();
    stimulus_attrs.insert("name".into(), json!("auditory"));
    stimulus_attrs.insert(
        "description".into(),
        json!("Stimuli presented to the subject, one onset/duration pair per trial"),
    );
    stimulus_attrs.insert(
        "trial_type".into(),
        json!(session.stimulus.iter().map(|e| &e.trial_type).collect::<Vec<_>>()),
    );
    create_group(&store, "/stimulus", stimulus_attrs)?;
    write_f64_1d(
        &store,
        "/stimulus/onset",
        "events",
        &Array1::from_iter(session.stimulus.iter().map(|e| e.onset)),
    )?;
    write_f64_1d(
        &store,
        "/stimulus/duration",
        "events",
        &Array1::from_iter(session.stimulus.iter().map(|e| e.duration)),
    )?;

    Ok(())
}

fn session_attributes(session: &MappedSession) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("identifier".into(), json!(session.identifier));
    attrs.insert(
        "session_description".into(),
        json!(session.session_description),
    );
    attrs.insert(
        "session_start_time".into(),
        json!(session.session_start.to_rfc3339()),
    );
    attrs.insert("notes".into(), json!(session.notes));
    attrs.insert("experimenter".into(), json!(session.experimenter));
    attrs.insert(
        "experiment_description".into(),
        json!(session.experiment.description),
    );
    attrs.insert("institution".into(), json!(session.experiment.institution));
    attrs.insert("keywords".into(), json!(session.experiment.keywords));
    attrs
}

fn subject_attributes(subject: &SubjectRecord) -> serde_json::Map<String, serde_json::Value> {
    let mut attrs = serde_json::Map::new();
    attrs.insert("subject_id".into(), json!(subject.subject_id));
    attrs.insert("sex".into(), json!(subject.sex.code()));
    if let Some(date_of_birth) = subject.date_of_birth {
        attrs.insert("date_of_birth".into(), json!(date_of_birth.to_string()));
    }
    attrs
}

fn write_optode_table(
    store: &Arc<FilesystemStore>,
    path: &str,
    optodes: &[Optode],
) -> Result<()> {
    let mut attrs = serde_json::Map::new();
    attrs.insert(
        "labels".into(),
        json!(optodes.iter().map(|o| &o.label).collect::<Vec<_>>()),
    );
    create_group(store, path, attrs)?;

    let mut positions = Array2::zeros((optodes.len(), 3));
    for (row, optode) in optodes.iter().enumerate() {
        for (col, value) in optode.position.iter().enumerate() {
            positions[[row, col]] = *value;
        }
    }
    write_f64_2d(
        store,
        &format!("{path}/positions"),
        ["optodes", "position"],
        &positions,
    )
}

fn create_group(
    store: &Arc<FilesystemStore>,
    path: &str,
    attrs: serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let mut group = GroupBuilder::new().build(store.clone(), path)?;
    group.attributes_mut().extend(attrs);
    group.store_metadata()?;
    Ok(())
}

fn write_f64_1d(
    store: &Arc<FilesystemStore>,
    path: &str,
    dimension: &str,
    values: &Array1<f64>,
) -> Result<()> {
    let len = values.len() as u64;
    let array = ArrayBuilder::new(
        vec![len],
        vec![len.max(1)],
        DataType::Float64,
        FillValue::from(0.0f64),
    )
    .dimension_names(Some(vec![Some(dimension.to_string())]))
    .build(store.clone(), path)?;
    array.store_metadata()?;
    if len > 0 {
        array.store_array_subset_ndarray::<f64, Ix1>(&[0], values.clone())?;
    }
    Ok(())
}

fn write_u64_1d(
    store: &Arc<FilesystemStore>,
    path: &str,
    dimension: &str,
    values: impl Iterator<Item = u64>,
) -> Result<()> {
    let values = Array1::from_iter(values);
    let len = values.len() as u64;
    let array = ArrayBuilder::new(
        vec![len],
        vec![len.max(1)],
        DataType::UInt64,
        FillValue::from(0u64),
    )
    .dimension_names(Some(vec![Some(dimension.to_string())]))
    .build(store.clone(), path)?;
    array.store_metadata()?;
    if len > 0 {
        array.store_array_subset_ndarray::<u64, Ix1>(&[0], values)?;
    }
    Ok(())
}

fn write_f64_2d(
    store: &Arc<FilesystemStore>,
    path: &str,
    dimensions: [&str; 2],
    values: &Array2<f64>,
) -> Result<()> {
    let (rows, cols) = values.dim();
    // One chunk per 4096 rows keeps chunks bounded for long recordings.
    let chunk_rows = (rows as u64).clamp(1, 4096);
    let array = ArrayBuilder::new(
        vec![rows as u64, cols as u64],
        vec![chunk_rows, (cols as u64).max(1)],
        DataType::Float64,
        FillValue::from(0.0f64),
    )
    .dimension_names(Some(
        dimensions
            .iter()
            .map(|d| Some(d.to_string()))
            .collect::<Vec<_>>(),
    ))
    .build(store.clone(), path)?;
    array.store_metadata()?;
    if rows > 0 && cols > 0 {
        array.store_array_subset_ndarray::<f64, Ix2>(&[0, 0], values.clone())?;
    }
    Ok(())
}

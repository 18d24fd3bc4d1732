//! BIDS sidecar metadata access.
//!
//! The dataset carries context that never makes it into the SNIRF containers:
//! the dataset description at the root, and per-subject coordinate-system,
//! task, and stimulus-event sidecars next to each recording. This module
//! parses those JSON/TSV files and knows the dataset's file-naming pattern.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConvertError;

/// Task label baked into every per-subject file name in this dataset.
pub const TASK: &str = "tapping";

/// `dataset_description.json` at the dataset root.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescription {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    #[serde(rename = "Authors", default)]
    pub authors: Vec<String>,
}

/// `sub-XX_coordsystem.json`: how the optode positions are expressed.
///
/// The file also carries anatomical landmark positions and a coordinate-frame
/// tag; those parse without error but are never mapped to the output.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinateSystem {
    #[serde(rename = "NIRSCoordinateSystem")]
    pub coordinate_system: String,
    #[serde(rename = "NIRSCoordinateSystemDescription")]
    pub description: String,
    #[serde(rename = "NIRSCoordinateUnits")]
    pub units: String,
}

/// `sub-XX_task-<task>_nirs.json`: session-level acquisition parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSidecar {
    #[serde(rename = "TaskName")]
    pub task_name: String,
    #[serde(rename = "PowerLineFrequency")]
    pub power_line_frequency: f64,
}

/// One row of the stimulus events table. Extra columns are tolerated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRow {
    pub onset: f64,
    pub duration: f64,
    pub trial_type: String,
}

/// Everything sidecar-sourced for one subject/session, loaded up front.
#[derive(Debug, Clone)]
pub struct SidecarBundle {
    pub dataset: DatasetDescription,
    pub coordinates: CoordinateSystem,
    pub task: TaskSidecar,
    pub events: Vec<EventRow>,
}

/// The `nirs` data directory for one subject/session.
pub fn nirs_dir(dataset_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    let mut dir = dataset_root.join(subject);
    if let Some(session) = session {
        dir = dir.join(session);
    }
    dir.join("nirs")
}

/// `sub-XX` or `sub-XX_ses-YY`, the stem every per-session file name starts with.
pub fn session_stem(subject: &str, session: Option<&str>) -> String {
    match session {
        Some(session) => format!("{subject}_{session}"),
        None => subject.to_string(),
    }
}

pub fn dataset_description_path(dataset_root: &Path) -> PathBuf {
    dataset_root.join("dataset_description.json")
}

pub fn snirf_path(dataset_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    nirs_dir(dataset_root, subject, session).join(format!(
        "{}_task-{TASK}_nirs.snirf",
        session_stem(subject, session)
    ))
}

pub fn events_path(dataset_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    nirs_dir(dataset_root, subject, session).join(format!(
        "{}_task-{TASK}_events.tsv",
        session_stem(subject, session)
    ))
}

pub fn coordsystem_path(dataset_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    nirs_dir(dataset_root, subject, session)
        .join(format!("{}_coordsystem.json", session_stem(subject, session)))
}

pub fn task_sidecar_path(dataset_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    nirs_dir(dataset_root, subject, session).join(format!(
        "{}_task-{TASK}_nirs.json",
        session_stem(subject, session)
    ))
}

/// Loads all four sidecar files for one subject/session.
pub fn load_sidecars(
    dataset_root: &Path,
    subject: &str,
    session: Option<&str>,
) -> Result<SidecarBundle, ConvertError> {
    Ok(SidecarBundle {
        dataset: load_json(&dataset_description_path(dataset_root))?,
        coordinates: load_json(&coordsystem_path(dataset_root, subject, session))?,
        task: load_json(&task_sidecar_path(dataset_root, subject, session))?,
        events: load_events(&events_path(dataset_root, subject, session))?,
    })
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConvertError> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    serde_json::from_reader(file)
        .map_err(|e| ConvertError::Schema(format!("{}: {e}", path.display())))
}

/// Parses the stimulus events table, one [`EventRow`] per data row, in file
/// order. Rows are passed through as given; nothing is filtered or reordered.
pub fn load_events(path: &Path) -> Result<Vec<EventRow>, ConvertError> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(file);

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let row: EventRow =
            row.map_err(|e| ConvertError::Schema(format!("{}: {e}", path.display())))?;
        rows.push(row);
    }
    Ok(rows)
}

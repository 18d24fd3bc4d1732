//! Destination (NWB) schema record set.
//!
//! Plain owned values, built once per subject/session by the mapping engine
//! and handed to the writer. Nothing mutates a [`MappedSession`] after
//! construction: either a fully valid record set exists or none does.

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::{Array1, Array2};

pub mod writer;

/// Subject sex in the destination vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Other,
    Unknown,
}

impl Sex {
    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
            Sex::Unknown => "U",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub subject_id: String,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Sex,
}

/// A source or detector element with a label and 3-D position.
#[derive(Debug, Clone, PartialEq)]
pub struct Optode {
    pub label: String,
    pub position: [f64; 3],
}

/// One row of the channel table.
///
/// `source_index`/`detector_index` are 1-based references into the optode
/// tables; `source_wavelength` is the physical value in nm resolved from the
/// probe wavelength table, never the raw index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub label: String,
    pub source_index: usize,
    pub detector_index: usize,
    pub source_wavelength: f64,
}

/// Raw acquisition data, `[time x channel]`, with one timestamp per row.
#[derive(Debug, Clone)]
pub struct OpticalTimeSeries {
    pub data: Array2<f64>,
    pub timestamps: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StimulusEvent {
    pub onset: f64,
    pub duration: f64,
    pub trial_type: String,
}

/// Dataset-level free text that cannot be derived from the source files.
#[derive(Debug, Clone, Default)]
pub struct ExperimentInfo {
    pub description: String,
    pub institution: String,
    pub keywords: Vec<String>,
}

/// The full destination record set for one subject/session.
#[derive(Debug, Clone)]
pub struct MappedSession {
    pub identifier: String,
    pub session_description: String,
    pub session_start: DateTime<Utc>,
    pub subject: SubjectRecord,
    pub notes: String,
    pub experimenter: Vec<String>,
    pub experiment: ExperimentInfo,
    pub channels: Vec<ChannelRow>,
    pub sources: Vec<Optode>,
    pub detectors: Vec<Optode>,
    pub series: OpticalTimeSeries,
    pub stimulus: Vec<StimulusEvent>,
}

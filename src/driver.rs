//! Batch conversion over a whole dataset.
//!
//! The driver enumerates `sub-*` directories under the dataset root, converts
//! each subject/session independently, and keeps going when one fails. A
//! failed subject leaves no output store behind and never disturbs the other
//! subjects; the final report says exactly which subjects converted and which
//! did not, and why.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use crate::bids::{self, SidecarBundle};
use crate::error::ConvertError;
use crate::layout;
use crate::mapping;
use crate::nwb::{ExperimentInfo, writer};
use crate::snirf::RecordSource;

pub const EXPERIMENT_DESCRIPTION: &str = "This experiment examines how the motor cortex is activated
during a finger tapping task. Participants are asked to either tap their left thumb to
fingers, tap their right thumb to fingers, or nothing (control). Tapping lasts for 5
seconds as is propted by an auditory cue. Sensors are placed over the motor cortex as
described in the montage section in the link below, short channels are attached to the
scalp too. Further details about the experiment (including presentation code) can be
found at https://github.com/rob-luke/experiment-fNIRS-tapping.
";
pub const INSTITUTION: &str = "Macquarie University";
pub const KEYWORDS: &[&str] = &["fNIRS", "Haemodynamics", "Motor Cortex", "Finger Tapping Task"];

/// Dataset-level metadata applied to every converted session.
pub fn experiment_info() -> ExperimentInfo {
    ExperimentInfo {
        description: EXPERIMENT_DESCRIPTION.to_string(),
        institution: INSTITUTION.to_string(),
        keywords: KEYWORDS.iter().map(|k| k.to_string()).collect(),
    }
}

/// What happened to one subject/session.
#[derive(Debug)]
pub struct SubjectOutcome {
    pub subject: String,
    pub session: Option<String>,
    pub output: Option<PathBuf>,
    /// `(kind, message)` when the subject failed, per [`ConvertError::kind`].
    pub failure: Option<(String, String)>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SubjectOutcome>,
}

impl BatchReport {
    pub fn converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failure.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.converted()
    }
}

/// Converts every subject found under `dataset_root`, continuing past
/// per-subject failures.
pub fn convert_dataset(dataset_root: &Path, output_root: &Path) -> Result<BatchReport> {
    if !dataset_root.is_dir() {
        bail!("dataset root {} is not a directory", dataset_root.display());
    }
    std::fs::create_dir_all(output_root)
        .with_context(|| format!("creating output root {}", output_root.display()))?;

    let mut report = BatchReport::default();
    for subject in list_subject_dirs(dataset_root)? {
        report
            .outcomes
            .extend(convert_subject(dataset_root, output_root, &subject));
    }

    if report.outcomes.is_empty() {
        warn!("no sub-* directories found under {}", dataset_root.display());
    }
    Ok(report)
}

/// Converts every session of one subject. All failures, including a failure
/// to enumerate the subject's sessions, stay within this subject's outcomes.
fn convert_subject(
    dataset_root: &Path,
    output_root: &Path,
    subject: &str,
) -> Vec<SubjectOutcome> {
    let sessions = match list_sessions(&dataset_root.join(subject)) {
        Ok(sessions) => sessions,
        Err(err) => return vec![failed_outcome(subject, None, &err)],
    };

    let mut outcomes = Vec::with_capacity(sessions.len());
    for session in sessions {
        let session = session.as_deref();
        match try_convert(dataset_root, output_root, subject, session) {
            Ok(output) => {
                info!(subject, output = %output.display(), "converted");
                outcomes.push(SubjectOutcome {
                    subject: subject.to_string(),
                    session: session.map(str::to_string),
                    output: Some(output),
                    failure: None,
                });
            }
            Err(err) => outcomes.push(failed_outcome(subject, session, &err)),
        }
    }
    outcomes
}

fn failed_outcome(subject: &str, session: Option<&str>, err: &anyhow::Error) -> SubjectOutcome {
    let kind = failure_kind(err);
    error!(subject, kind, "conversion failed: {err:#}");
    SubjectOutcome {
        subject: subject.to_string(),
        session: session.map(str::to_string),
        output: None,
        failure: Some((kind.to_string(), format!("{err:#}"))),
    }
}

/// `sub-NN` directories directly under the dataset root, sorted by name.
pub fn list_subject_dirs(dataset_root: &Path) -> Result<Vec<String>> {
    let mut subjects = Vec::new();
    for entry in std::fs::read_dir(dataset_root)
        .with_context(|| format!("reading {}", dataset_root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_subject_dir(&name) {
            subjects.push(name);
        }
    }
    subjects.sort();
    Ok(subjects)
}

fn is_subject_dir(name: &str) -> bool {
    name.strip_prefix("sub-")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// `ses-*` directories under one subject, or a single `None` entry for the
/// flat single-session layout.
fn list_sessions(subject_dir: &Path) -> Result<Vec<Option<String>>> {
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(subject_dir)
        .with_context(|| format!("reading {}", subject_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() && name.starts_with("ses-") {
            sessions.push(Some(name));
        }
    }
    if sessions.is_empty() {
        return Ok(vec![None]);
    }
    sessions.sort();
    Ok(sessions)
}

fn try_convert(
    dataset_root: &Path,
    output_root: &Path,
    subject: &str,
    session: Option<&str>,
) -> Result<PathBuf> {
    for required in [
        bids::dataset_description_path(dataset_root),
        bids::snirf_path(dataset_root, subject, session),
        bids::coordsystem_path(dataset_root, subject, session),
        bids::task_sidecar_path(dataset_root, subject, session),
        bids::events_path(dataset_root, subject, session),
    ] {
        if !required.is_file() {
            return Err(ConvertError::io(
                required,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
            .into());
        }
    }

    let sidecars = bids::load_sidecars(dataset_root, subject, session)?;
    let source = open_source(&bids::snirf_path(dataset_root, subject, session))?;
    convert_session_from(source.as_ref(), &sidecars, output_root, subject, session)
}

/// Converts one subject/session from an already-open source container.
pub fn convert_session_from(
    source: &dyn RecordSource,
    sidecars: &SidecarBundle,
    output_root: &Path,
    subject: &str,
    session: Option<&str>,
) -> Result<PathBuf> {
    let identifier = format!("{}_task-{}_nirs", bids::session_stem(subject, session), bids::TASK);
    let experiment = experiment_info();
    let mapped = mapping::map_session(source, sidecars, &identifier, &experiment)?;

    let output = layout::planned_path(output_root, subject, session);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    writer::write_session(&mapped, &output)?;
    Ok(output)
}

#[cfg(feature = "snirf-hdf5")]
fn open_source(path: &Path) -> Result<Box<dyn RecordSource>> {
    Ok(Box::new(crate::snirf::hdf5::Hdf5Source::open(path)?))
}

#[cfg(not(feature = "snirf-hdf5"))]
fn open_source(path: &Path) -> Result<Box<dyn RecordSource>> {
    bail!(
        "cannot open {}: built without SNIRF container support, rebuild with --features snirf-hdf5",
        path.display()
    )
}

/// Classifies a failure for the batch report.
pub fn failure_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<ConvertError>()
        .map(ConvertError::kind)
        .unwrap_or("io")
}

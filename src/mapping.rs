//! The field-mapping engine.
//!
//! [`map_session`] turns one subject's source container plus its sidecar
//! metadata into a complete [`MappedSession`]. This is the only place where
//! domain semantics live: fixed-value validation, index resolution between the
//! channel list and the probe tables, cross-source precedence, and the fixed
//! session-notes layout. It is a pure function of its inputs; any failure
//! leaves no partial output behind.

use chrono::{NaiveDate, NaiveDateTime};

use crate::bids::SidecarBundle;
use crate::error::ConvertError;
use crate::nwb::{
    ChannelRow, ExperimentInfo, MappedSession, Optode, OpticalTimeSeries, Sex, StimulusEvent,
    SubjectRecord,
};
use crate::snirf::{self, RecordSource};
use crate::validate;

pub const CONVERTER_NAME: &str = env!("CARGO_PKG_NAME");
pub const CONVERTER_VERSION: &str = env!("CARGO_PKG_VERSION");

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Maps one subject/session to the destination record set.
///
/// Stimulus events come exclusively from the sidecar events table; the
/// container's own stimulus blocks are ignored by precedence, never merged or
/// cross-validated against it.
pub fn map_session(
    source: &dyn RecordSource,
    sidecars: &SidecarBundle,
    identifier: &str,
    experiment: &ExperimentInfo,
) -> Result<MappedSession, ConvertError> {
    validate::check_units(source)?;

    let sources = optode_table(
        snirf::source_labels(source)?,
        snirf::source_positions(source)?,
        "source",
    )?;
    let detectors = optode_table(
        snirf::detector_labels(source)?,
        snirf::detector_positions(source)?,
        "detector",
    )?;
    // Shared wavelength table, resolved once for all channels.
    let wavelengths = snirf::wavelengths(source)?;

    let entries = snirf::channel_entries(source)?;
    let mut channels = Vec::with_capacity(entries.len());
    for entry in &entries {
        validate::check_channel_data_type(entry)?;

        let source_optode = lookup(&sources, entry.source_index, entry.list_index, "source")?;
        let detector_optode =
            lookup(&detectors, entry.detector_index, entry.list_index, "detector")?;
        let wavelength = *wavelengths
            .get(table_index(entry.wavelength_index, entry.list_index, "wavelength")?)
            .ok_or_else(|| {
                ConvertError::Consistency(format!(
                    "measurementList{}: wavelengthIndex {} exceeds the {}-entry wavelength table",
                    entry.list_index,
                    entry.wavelength_index,
                    wavelengths.len()
                ))
            })?;

        channels.push(ChannelRow {
            label: format!(
                "{}_{} {:.0}",
                source_optode.label, detector_optode.label, wavelength
            ),
            source_index: entry.source_index as usize,
            detector_index: entry.detector_index as usize,
            source_wavelength: wavelength,
        });
    }

    let data = snirf::data_matrix(source)?;
    let timestamps = snirf::timestamps(source)?;
    if timestamps.len() != data.nrows() {
        return Err(ConvertError::Consistency(format!(
            "{} timestamps for {} data rows",
            timestamps.len(),
            data.nrows()
        )));
    }
    if channels.len() != data.ncols() {
        return Err(ConvertError::Consistency(format!(
            "{} channel entries for {} data columns",
            channels.len(),
            data.ncols()
        )));
    }

    let subject = subject_record(source)?;
    let session_start = session_start(source)?;
    let notes = compile_notes(source, sidecars)?;

    let stimulus = sidecars
        .events
        .iter()
        .map(|row| StimulusEvent {
            onset: row.onset,
            duration: row.duration,
            trial_type: row.trial_type.clone(),
        })
        .collect();

    Ok(MappedSession {
        identifier: identifier.to_string(),
        session_description: format!(
            "{} NIRS recording data for a finger-tapping task",
            subject.subject_id
        ),
        session_start,
        subject,
        notes,
        experimenter: sidecars.dataset.authors.clone(),
        experiment: experiment.clone(),
        channels,
        sources,
        detectors,
        series: OpticalTimeSeries { data, timestamps },
        stimulus,
    })
}

fn optode_table(
    labels: Vec<String>,
    positions: ndarray::Array2<f64>,
    role: &str,
) -> Result<Vec<Optode>, ConvertError> {
    if positions.ncols() != 3 {
        return Err(ConvertError::Consistency(format!(
            "{role} positions have {} columns, expected 3",
            positions.ncols()
        )));
    }
    if labels.len() != positions.nrows() {
        return Err(ConvertError::Consistency(format!(
            "{} {role} labels for {} positions",
            labels.len(),
            positions.nrows()
        )));
    }
    Ok(labels
        .into_iter()
        .zip(positions.rows())
        .map(|(label, row)| Optode {
            label,
            position: [row[0], row[1], row[2]],
        })
        .collect())
}

/// Converts a 1-based container index to a table offset.
fn table_index(index: i64, list_index: usize, role: &str) -> Result<usize, ConvertError> {
    if index < 1 {
        return Err(ConvertError::Consistency(format!(
            "measurementList{list_index}: {role} index {index} is not 1-based"
        )));
    }
    Ok((index - 1) as usize)
}

fn lookup<'a>(
    table: &'a [Optode],
    index: i64,
    list_index: usize,
    role: &str,
) -> Result<&'a Optode, ConvertError> {
    table
        .get(table_index(index, list_index, role)?)
        .ok_or_else(|| {
            ConvertError::Consistency(format!(
                "measurementList{list_index}: {role} index {index} exceeds the {}-entry {role} table",
                table.len()
            ))
        })
}

fn subject_record(source: &dyn RecordSource) -> Result<SubjectRecord, ConvertError> {
    let subject_id = snirf::meta_tag(source, "SubjectID")?;

    let date_of_birth = match snirf::meta_tag(source, "DateOfBirth") {
        Ok(raw) => Some(NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
            ConvertError::Schema(format!("DateOfBirth '{raw}' is not a {DATE_FORMAT} date: {e}"))
        })?),
        Err(ConvertError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let sex = match snirf::meta_tag(source, "sex") {
        Ok(code) => parse_sex(&code)?,
        Err(ConvertError::NotFound(_)) => Sex::Unknown,
        Err(e) => return Err(e),
    };

    Ok(SubjectRecord {
        subject_id,
        date_of_birth,
        sex,
    })
}

/// SNIRF metaDataTags encode sex numerically (1 male, 2 female, 0 unknown);
/// destination-vocabulary literals are accepted as well.
fn parse_sex(code: &str) -> Result<Sex, ConvertError> {
    match code.trim() {
        "1" | "M" => Ok(Sex::Male),
        "2" | "F" => Ok(Sex::Female),
        "O" => Ok(Sex::Other),
        "0" | "U" => Ok(Sex::Unknown),
        other => Err(ConvertError::Schema(format!(
            "unrecognized sex code '{other}'"
        ))),
    }
}

/// Combines MeasurementDate and MeasurementTime into one UTC session start.
/// Both tags are required: defaulting to an arbitrary epoch would make
/// session ordering across the dataset meaningless.
fn session_start(source: &dyn RecordSource) -> Result<chrono::DateTime<chrono::Utc>, ConvertError> {
    let date = required_tag(source, "MeasurementDate")?;
    let time = required_tag(source, "MeasurementTime")?;
    let combined = format!("{date}T{time}");
    Ok(NaiveDateTime::parse_from_str(&combined, DATETIME_FORMAT)
        .map_err(|e| {
            ConvertError::Schema(format!(
                "cannot derive session start from '{combined}': {e}"
            ))
        })?
        .and_utc())
}

fn required_tag(source: &dyn RecordSource, tag: &str) -> Result<String, ConvertError> {
    snirf::meta_tag(source, tag).map_err(|e| match e {
        ConvertError::NotFound(_) => {
            ConvertError::Schema(format!("required metadata tag '{tag}' is absent"))
        }
        other => other,
    })
}

/// Session notes in fixed order, one `key: value` line each.
fn compile_notes(
    source: &dyn RecordSource,
    sidecars: &SidecarBundle,
) -> Result<String, ConvertError> {
    let lines = [
        ("Source file SNIRF version", snirf::format_version(source)?),
        (
            "Source dataset BIDS version",
            sidecars.dataset.bids_version.clone(),
        ),
        ("Conversion tool", CONVERTER_NAME.to_string()),
        ("Conversion tool version", CONVERTER_VERSION.to_string()),
        (
            "NIRSCoordinateSystem",
            sidecars.coordinates.coordinate_system.clone(),
        ),
        (
            "NIRSCoordinateSystemDescription",
            sidecars.coordinates.description.clone(),
        ),
        ("NIRSCoordinateUnits", sidecars.coordinates.units.clone()),
        ("TaskName", sidecars.task.task_name.clone()),
        (
            "PowerLineFrequency",
            sidecars.task.power_line_frequency.to_string(),
        ),
    ];
    Ok(lines
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bids::{CoordinateSystem, DatasetDescription, EventRow, TaskSidecar};
    use crate::snirf::{MemorySource, RecordValue};
    use ndarray::{Array2, arr2};

    fn insert_channel(
        source: &mut MemorySource,
        index: usize,
        source_index: i64,
        detector_index: i64,
        wavelength_index: i64,
    ) {
        let group = format!("/nirs/data1/measurementList{index}");
        source.insert(format!("{group}/sourceIndex"), RecordValue::Int(source_index));
        source.insert(
            format!("{group}/detectorIndex"),
            RecordValue::Int(detector_index),
        );
        source.insert(
            format!("{group}/wavelengthIndex"),
            RecordValue::Int(wavelength_index),
        );
        source.insert(format!("{group}/dataType"), RecordValue::Int(1));
        source.insert(format!("{group}/dataTypeIndex"), RecordValue::Int(1));
    }

    fn fixture_source() -> MemorySource {
        let mut s = MemorySource::new();
        s.insert("/formatVersion", RecordValue::Str("1.0".into()));
        s.insert(
            "/nirs/metaDataTags/LengthUnit",
            RecordValue::Str("m".into()),
        );
        s.insert("/nirs/metaDataTags/TimeUnit", RecordValue::Str("s".into()));
        s.insert(
            "/nirs/metaDataTags/FrequencyUnit",
            RecordValue::Str("Hz".into()),
        );
        s.insert(
            "/nirs/metaDataTags/MeasurementDate",
            RecordValue::Str("2020-01-03".into()),
        );
        s.insert(
            "/nirs/metaDataTags/MeasurementTime",
            RecordValue::Str("10:30:00Z".into()),
        );
        s.insert(
            "/nirs/metaDataTags/SubjectID",
            RecordValue::Str("sub-01".into()),
        );
        s.insert(
            "/nirs/metaDataTags/DateOfBirth",
            RecordValue::Str("1990-06-15".into()),
        );
        s.insert("/nirs/metaDataTags/sex", RecordValue::Str("1".into()));
        s.insert(
            "/nirs/probe/sourceLabels",
            RecordValue::StrVec(vec!["S1".into(), "S2".into()]),
        );
        s.insert(
            "/nirs/probe/detectorLabels",
            RecordValue::StrVec(vec!["D1".into(), "D2".into()]),
        );
        s.insert(
            "/nirs/probe/sourcePos3D",
            RecordValue::FloatMatrix(arr2(&[[0.0, 0.0, 0.0], [0.1, 0.0, 0.0]])),
        );
        s.insert(
            "/nirs/probe/detectorPos3D",
            RecordValue::FloatMatrix(arr2(&[[0.0, 0.03, 0.0], [0.1, 0.03, 0.0]])),
        );
        s.insert(
            "/nirs/probe/wavelengths",
            RecordValue::FloatVec(vec![760.0, 850.0]),
        );
        insert_channel(&mut s, 1, 1, 1, 1);
        insert_channel(&mut s, 2, 1, 1, 2);
        insert_channel(&mut s, 3, 2, 2, 1);
        s.insert(
            "/nirs/data1/dataTimeSeries",
            RecordValue::FloatMatrix(Array2::from_shape_fn((4, 3), |(t, c)| {
                (t * 10 + c) as f64
            })),
        );
        s.insert(
            "/nirs/data1/time",
            RecordValue::FloatVec(vec![0.0, 0.1, 0.2, 0.3]),
        );
        s
    }

    fn fixture_sidecars() -> SidecarBundle {
        SidecarBundle {
            dataset: DatasetDescription {
                name: Some("fNIRS Tapping".into()),
                bids_version: "1.4.0".into(),
                authors: vec!["A. One".into(), "B. Two".into()],
            },
            coordinates: CoordinateSystem {
                coordinate_system: "MNI152NLin6Sym".into(),
                description: "MNI template space".into(),
                units: "m".into(),
            },
            task: TaskSidecar {
                task_name: "tapping".into(),
                power_line_frequency: 50.0,
            },
            events: vec![
                EventRow {
                    onset: 1.5,
                    duration: 5.0,
                    trial_type: "Tapping/Left".into(),
                },
                EventRow {
                    onset: 12.25,
                    duration: 5.0,
                    trial_type: "Tapping/Right".into(),
                },
            ],
        }
    }

    fn map_fixture(source: &MemorySource) -> Result<MappedSession, ConvertError> {
        map_session(
            source,
            &fixture_sidecars(),
            "sub-01_task-tapping_nirs",
            &ExperimentInfo::default(),
        )
    }

    #[test]
    fn one_channel_row_per_measurement_list_entry_in_source_order() {
        let session = map_fixture(&fixture_source()).unwrap();
        assert_eq!(session.channels.len(), 3);
        assert_eq!(session.channels[0].label, "S1_D1 760");
        assert_eq!(session.channels[1].label, "S1_D1 850");
        assert_eq!(session.channels[2].label, "S2_D2 760");
    }

    #[test]
    fn wavelength_index_resolves_to_physical_value() {
        let session = map_fixture(&fixture_source()).unwrap();
        // wavelengthIndex=1 with wavelengths=[760.0, 850.0] is 760.0, not 1.0.
        assert_eq!(session.channels[0].source_wavelength, 760.0);
        assert_eq!(session.channels[1].source_wavelength, 850.0);
    }

    #[test]
    fn non_cw_channel_aborts_the_session() {
        let mut source = fixture_source();
        source.insert(
            "/nirs/data1/measurementList2/dataType",
            RecordValue::Int(2),
        );
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn wrong_length_unit_aborts_the_session() {
        let mut source = fixture_source();
        source.insert(
            "/nirs/metaDataTags/LengthUnit",
            RecordValue::Str("cm".into()),
        );
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("LengthUnit"));
    }

    #[test]
    fn timestamp_length_mismatch_is_a_consistency_error() {
        let mut source = fixture_source();
        source.insert(
            "/nirs/data1/time",
            RecordValue::FloatVec(vec![0.0, 0.1, 0.2]),
        );
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "consistency");
    }

    #[test]
    fn out_of_range_detector_index_is_a_consistency_error() {
        let mut source = fixture_source();
        source.insert(
            "/nirs/data1/measurementList3/detectorIndex",
            RecordValue::Int(7),
        );
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "consistency");
        assert!(err.to_string().contains("detector index 7"));
    }

    #[test]
    fn missing_measurement_date_fails_instead_of_defaulting() {
        let mut source = fixture_source();
        source.remove("/nirs/metaDataTags/MeasurementDate");
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(err.to_string().contains("MeasurementDate"));
    }

    #[test]
    fn session_start_combines_date_and_time() {
        let session = map_fixture(&fixture_source()).unwrap();
        assert_eq!(
            session.session_start.to_rfc3339(),
            "2020-01-03T10:30:00+00:00"
        );
    }

    #[test]
    fn subject_record_is_mapped() {
        let session = map_fixture(&fixture_source()).unwrap();
        assert_eq!(session.subject.subject_id, "sub-01");
        assert_eq!(session.subject.sex, Sex::Male);
        assert_eq!(
            session.subject.date_of_birth,
            Some(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap())
        );
    }

    #[test]
    fn absent_date_of_birth_maps_to_none() {
        let mut source = fixture_source();
        source.remove("/nirs/metaDataTags/DateOfBirth");
        let session = map_fixture(&source).unwrap();
        assert_eq!(session.subject.date_of_birth, None);
    }

    #[test]
    fn unknown_sex_code_is_a_schema_error() {
        let mut source = fixture_source();
        source.insert("/nirs/metaDataTags/sex", RecordValue::Str("7".into()));
        let err = map_fixture(&source).unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn stimulus_rows_pass_through_from_the_sidecar_table() {
        let session = map_fixture(&fixture_source()).unwrap();
        assert_eq!(session.stimulus.len(), 2);
        assert_eq!(session.stimulus[0].onset, 1.5);
        assert_eq!(session.stimulus[0].duration, 5.0);
        assert_eq!(session.stimulus[1].trial_type, "Tapping/Right");
    }

    #[test]
    fn notes_lines_follow_the_fixed_order() {
        let session = map_fixture(&fixture_source()).unwrap();
        let keys: Vec<&str> = session
            .notes
            .lines()
            .map(|line| line.split(':').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                "Source file SNIRF version",
                "Source dataset BIDS version",
                "Conversion tool",
                "Conversion tool version",
                "NIRSCoordinateSystem",
                "NIRSCoordinateSystemDescription",
                "NIRSCoordinateUnits",
                "TaskName",
                "PowerLineFrequency",
            ]
        );
        assert!(session.notes.contains("PowerLineFrequency: 50"));
    }

    #[test]
    fn optode_tables_preserve_one_based_indexing() {
        let session = map_fixture(&fixture_source()).unwrap();
        assert_eq!(session.sources[0].label, "S1");
        assert_eq!(session.sources[1].position, [0.1, 0.0, 0.0]);
        assert_eq!(session.channels[2].source_index, 2);
        assert_eq!(session.channels[2].detector_index, 2);
    }
}

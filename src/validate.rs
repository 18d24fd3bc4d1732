//! Fixed-value invariants on source fields.
//!
//! A handful of container fields encode assumptions baked into every
//! downstream numeric value: the units of measurement, and the per-channel
//! data-type codes that mark the data as continuous-wave amplitude. A
//! deviation here would silently corrupt every derived series, so these are
//! checked against a fixed table and any mismatch aborts the subject.

use crate::error::ConvertError;
use crate::snirf::{self, ChannelEntry, RecordSource};

/// Units of measurement every container in the dataset must declare.
pub const EXPECTED_UNITS: &[(&str, &str)] = &[
    ("LengthUnit", "m"),
    ("TimeUnit", "s"),
    ("FrequencyUnit", "Hz"),
];

/// SNIRF data-type code for continuous-wave amplitude.
pub const CW_AMPLITUDE: i64 = 1;

/// Checks one observed value against its accepted set.
pub fn check_expected(
    field: &str,
    observed: &str,
    accepted: &[&str],
) -> Result<(), ConvertError> {
    if accepted.contains(&observed) {
        Ok(())
    } else {
        Err(ConvertError::Validation {
            field: field.to_string(),
            expected: accepted.join(" or "),
            observed: observed.to_string(),
        })
    }
}

/// Verifies the declared units of measurement against [`EXPECTED_UNITS`].
pub fn check_units(source: &dyn RecordSource) -> Result<(), ConvertError> {
    for (tag, expected) in EXPECTED_UNITS {
        let observed = snirf::meta_tag(source, tag)?;
        check_expected(tag, &observed, &[expected])?;
    }
    Ok(())
}

/// Verifies that one channel entry is continuous-wave amplitude data.
pub fn check_channel_data_type(entry: &ChannelEntry) -> Result<(), ConvertError> {
    check_expected(
        &format!("measurementList{}/dataType", entry.list_index),
        &entry.data_type.to_string(),
        &[&CW_AMPLITUDE.to_string()],
    )?;
    check_expected(
        &format!("measurementList{}/dataTypeIndex", entry.list_index),
        &entry.data_type_index.to_string(),
        &["1"],
    )
}

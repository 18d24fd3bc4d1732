//! Plans output store locations under the destination root.
//!
//! Pure path arithmetic: nothing here touches the filesystem, so the same
//! inputs always plan the same location and re-running a conversion
//! overwrites its previous output instead of scattering new files.

use std::path::{Path, PathBuf};

use crate::bids::{TASK, session_stem};

/// The store path for one subject/session:
/// `<output_root>/<subject>/<stem>_task-tapping_nirs.nwb`.
pub fn planned_path(output_root: &Path, subject: &str, session: Option<&str>) -> PathBuf {
    output_root.join(subject).join(format!(
        "{}_task-{TASK}_nirs.nwb",
        session_stem(subject, session)
    ))
}

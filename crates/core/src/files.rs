//! Reading files handed out by the debug interface.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::CoreError;

/// Read a whole file, mapping I/O failures onto the domain taxonomy.
///
/// `label` names the resource in error messages instead of the full path.
pub async fn read_file(path: &Path, label: &str) -> Result<Vec<u8>, CoreError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => CoreError::ResourceNotFound(label.to_string()),
        ErrorKind::PermissionDenied => CoreError::Forbidden(format!("could not open '{label}'")),
        _ => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read debug file");
            CoreError::OperationFailed(format!("could not read '{label}': {e}"))
        }
    })
}

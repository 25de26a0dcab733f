use std::path::{Component, Path};

use crate::TransferError;

/// Checks that a peer-supplied name is a single plain file name.
///
/// Rejects empty names, `.`/`..`, absolute paths, drive prefixes, anything
/// containing a separator (either `/` or `\`, regardless of platform) and
/// NUL bytes.
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidName(format!(
            "name must not contain path separators: {name:?}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir | Component::CurDir), _) => Err(TransferError::InvalidName(
            format!("relative directory reference not allowed: {name:?}"),
        )),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name:?}"
        ))),
    }
}

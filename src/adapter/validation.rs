//! Bucket and file name validation

use std::path::{Component, Path};

use crate::connection::Provider;
use crate::{Error, Result};

/// Reject names no backend accepts, plus provider-specific rules.
///
/// `None` stands for a missing name. The literal strings `"null"` and
/// `"undefined"` are rejected too; they are what a missing value becomes
/// after passing through a string-typed form or query string.
pub fn validate_name(name: Option<&str>, provider: Provider) -> Result<()> {
    let name = reject_placeholders(name, "Bucket name")?;

    if matches!(name, "." | "..") || name.contains(['/', '\\']) {
        return Err(Error::invalid_name(format!(
            "Bucket name can not be '.' or '..' or contain a path separator: '{}'",
            name
        )));
    }

    if provider == Provider::B2 && name.contains('_') {
        return Err(Error::invalid_name(format!(
            "Backblaze B2 bucket names can not contain underscores: '{}'",
            name
        )));
    }
    Ok(())
}

/// Validate the name of a file inside a bucket.
pub fn validate_file_name(name: &str) -> Result<()> {
    let name = reject_placeholders(Some(name), "File name")?;

    if name.starts_with(['/', '\\']) {
        return Err(Error::invalid_name(format!(
            "File name can not be an absolute path: '{}'",
            name
        )));
    }

    for component in Path::new(name).components() {
        match component {
            Component::ParentDir => {
                return Err(Error::invalid_name(format!(
                    "File name can not contain '..': '{}'",
                    name
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_name(format!(
                    "File name can not be an absolute path: '{}'",
                    name
                )))
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

fn reject_placeholders<'a>(name: Option<&'a str>, label: &str) -> Result<&'a str> {
    let Some(name) = name else {
        return Err(Error::invalid_name(format!("{} can not be empty", label)));
    };
    match name {
        "null" | "undefined" => Err(Error::invalid_name(format!(
            "Please do not use the string '{}' as {}",
            name,
            label.to_ascii_lowercase()
        ))),
        _ if name.trim().is_empty() => Err(Error::invalid_name(format!(
            "{} can not be an empty string",
            label
        ))),
        _ => Ok(name),
    }
}

//! Derivation and validation of identifiers that end up as platform object
//! names and label values.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Label values and most object names are limited to 63 characters.
pub const MAX_LABEL_LEN: usize = 63;

/// Suffix appended to an instance's base name to name its volume.
pub const VOLUME_SUFFIX: &str = "-data";

/// Longest base name that still leaves room for [`VOLUME_SUFFIX`].
pub const MAX_RESOURCE_NAME_LEN: usize = MAX_LABEL_LEN - VOLUME_SUFFIX.len();

pub const MAX_PROJECT_ID_LEN: usize = 40;

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("Invalid label regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error(
        "{field} '{value}' must consist of lowercase letters, digits and '-', and start and end with a letter or digit"
    )]
    InvalidCharacters { field: &'static str, value: String },

    #[error("{field} '{value}' is too long (max {max} characters)")]
    TooLong {
        field: &'static str,
        value: String,
        max: usize,
    },
}

/// Validate a single DNS-1123 label.
pub fn validate_label(field: &'static str, value: &str, max: usize) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty { field });
    }
    if value.len() > max {
        return Err(NameError::TooLong {
            field,
            value: value.to_string(),
            max,
        });
    }
    if !DNS_LABEL.is_match(value) {
        return Err(NameError::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Normalise owner or project-name input: trimmed and lowercased.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Derive the project identifier from its owner and name.
///
/// `("acme", "shop")` yields `"acme-shop"`. Inputs are normalised first, so
/// the derivation is deterministic for any casing of the same pair.
pub fn derive_project_id(owner: &str, name: &str) -> Result<String, NameError> {
    let owner = normalize(owner);
    let name = normalize(name);
    validate_label("owner", &owner, MAX_PROJECT_ID_LEN)?;
    validate_label("name", &name, MAX_PROJECT_ID_LEN)?;

    let id = format!("{owner}-{name}");
    validate_label("project id", &id, MAX_PROJECT_ID_LEN)?;
    Ok(id)
}

/// Base name shared by an instance's compute unit and endpoint.
///
/// The join is not injective: `("acme-shop", "db-1")` and
/// `("acme-shop-db", "1")` give the same name. Callers decide ownership
/// from the object's labels.
pub fn instance_resource_name(project_id: &str, instance: &str) -> Result<String, NameError> {
    validate_label("database name", instance, MAX_RESOURCE_NAME_LEN)?;
    let base = format!("{project_id}-{instance}");
    validate_label("database resource name", &base, MAX_RESOURCE_NAME_LEN)?;
    Ok(base)
}

pub fn volume_name(resource_name: &str) -> String {
    format!("{resource_name}{VOLUME_SUFFIX}")
}

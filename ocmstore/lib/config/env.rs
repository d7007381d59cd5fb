use std::{env, sync::LazyLock};

use crate::artifactset::StructureFormat;

use super::DEFAULT_STRUCTURE_FORMAT;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable selecting the structure format of new artifact sets.
pub const OCM_ARTIFACTSET_FORMAT_ENV_VAR: &str = "OCM_ARTIFACTSET_FORMAT";

static ENV_STRUCTURE_FORMAT: LazyLock<Option<StructureFormat>> = LazyLock::new(|| {
    let value = env::var(OCM_ARTIFACTSET_FORMAT_ENV_VAR).ok()?;
    parse_structure_format(&value)
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the structure format for new artifact sets.
///
/// The value of [`OCM_ARTIFACTSET_FORMAT_ENV_VAR`] is read once. Unset or invalid values fall
/// back to [`DEFAULT_STRUCTURE_FORMAT`].
pub fn get_default_structure_format() -> StructureFormat {
    ENV_STRUCTURE_FORMAT.unwrap_or(DEFAULT_STRUCTURE_FORMAT)
}

fn parse_structure_format(value: &str) -> Option<StructureFormat> {
    match value.parse::<StructureFormat>() {
        Ok(format) => Some(format),
        Err(e) => {
            tracing::warn!(
                "ignoring {}={}: {}, using default: {}",
                OCM_ARTIFACTSET_FORMAT_ENV_VAR,
                value,
                e,
                DEFAULT_STRUCTURE_FORMAT
            );
            None
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_parse_structure_format() {
        assert_eq!(parse_structure_format("ocm"), Some(StructureFormat::Ocm));
        assert_eq!(
            parse_structure_format("oci-compliant"),
            Some(StructureFormat::OciCompliant)
        );
        assert_eq!(parse_structure_format("zip"), None);
    }
}

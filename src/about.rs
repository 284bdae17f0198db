use crate::plate::PlatePreset;
use itertools::Itertools;
use synbio_protocol::ECHO_PROTOCOL_SCHEMA;

pub const SYNBIO_DISPLAY_VERSION: &str = env!("SYNBIO_DISPLAY_VERSION");
pub const SYNBIO_BUILD_N: &str = env!("SYNBIO_BUILD_N");

/// Text printed by `synbio_cli --version`: version, build stamp, protocol
/// schema and the plate presets this build knows about.
pub fn version_cli_text() -> String {
    let presets = PlatePreset::all()
        .iter()
        .map(|p| p.default_name())
        .join(", ");
    format!(
        "synbio {SYNBIO_DISPLAY_VERSION} (build {SYNBIO_BUILD_N})\n\
         Protocol schema: {ECHO_PROTOCOL_SCHEMA}\n\
         Plate presets: {presets}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_text_names_build_and_schema() {
        let text = version_cli_text();
        assert!(text.starts_with("synbio "));
        assert!(text.contains(SYNBIO_BUILD_N));
        assert!(text.contains(ECHO_PROTOCOL_SCHEMA));
        assert!(text.contains("384LDV"));
    }
}

use naga::valid::{Capabilities, ValidationFlags, Validator};

/// Parses and validates a complete WGSL module with naga.
///
/// Returns a human-readable diagnostic on failure. Parse errors are rendered against
/// the source so they carry line and column information.
pub fn validate_wgsl(source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|e| format!("validation error: {e:?}"))?;

    Ok(module)
}

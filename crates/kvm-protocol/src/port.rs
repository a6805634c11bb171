//! Input/output port state shared by the device state machines

/// An input port on a switching device
///
/// Ports are named by the zero-padded index the device itself prints
/// ("01", "02", ...) so that names round-trip into switch commands verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputPort {
    /// Port name as printed by the device
    pub name: String,
    /// Whether a source is currently detected on this port
    pub active: bool,
    /// Protocol identity reported for the attached source (EDID-style)
    pub identity: String,
}

/// An output port on a switching device
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputPort {
    /// Port name as printed by the device
    pub name: String,
    /// Whether the output is live (sink detected and output enabled)
    pub active: bool,
    /// Name of the input currently routed to this output
    pub source: String,
    /// Protocol identity reported for this output
    pub identity: String,
    /// Whether the output is muted
    pub muted: bool,
}

/// Interpret a status-table activity field
///
/// The hardware prints "On"/"Off" in some columns and "Yes"/"No" in others;
/// both affirmative forms count as active, any other text does not.
pub fn is_active(field: &str) -> bool {
    field.eq_ignore_ascii_case("on") || field.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::is_active;

    #[test]
    fn test_activity_fields() {
        assert!(is_active("On"));
        assert!(is_active("YES"));
        assert!(!is_active("Off"));
        assert!(!is_active("No"));
        assert!(!is_active(""));
    }
}

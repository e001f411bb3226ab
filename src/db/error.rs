use thiserror::Error;

/// Topology validation errors, detected before any write and returned to
/// the caller verbatim. Downcast from `anyhow::Error` in the API layer to
/// pick the HTTP status and the stable `kind` tag.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("port {port} is out of range (1..={max})")]
    PortOutOfRange { port: i64, max: i64 },

    #[error("port {port} is {class} class and cannot bind to a {panel_kind} panel")]
    PortClassMismatch {
        port: i64,
        class: &'static str,
        panel_kind: &'static str,
    },

    #[error("{panel_kind} panel {panel_id} is not in the switch's rack")]
    RackMismatch {
        panel_kind: &'static str,
        panel_id: i64,
    },

    #[error("rack {rack_id} slot conflict: {detail}")]
    SlotOverflow { rack_id: i64, detail: String },

    #[error("{panel_kind} panel not found: {panel_id}")]
    PanelNotFound {
        panel_kind: &'static str,
        panel_id: i64,
    },

    #[error("jumper chain exceeds {max} hops; possible cycle")]
    JumpChainTooLong { max: usize },

    #[error("already bound elsewhere: {detail}")]
    AlreadyBoundElsewhere { detail: String },
}

impl TopologyError {
    /// Stable machine-readable tag for the error response body
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyError::PortOutOfRange { .. } => "port_out_of_range",
            TopologyError::PortClassMismatch { .. } => "port_class_mismatch",
            TopologyError::RackMismatch { .. } => "rack_mismatch",
            TopologyError::SlotOverflow { .. } => "slot_overflow",
            TopologyError::PanelNotFound { .. } => "panel_not_found",
            TopologyError::JumpChainTooLong { .. } => "jump_chain_too_long",
            TopologyError::AlreadyBoundElsewhere { .. } => "already_bound_elsewhere",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TopologyError::PortOutOfRange { port: 49, max: 48 };
        assert_eq!(err.to_string(), "port 49 is out of range (1..=48)");
    }

    #[test]
    fn test_error_class_mismatch() {
        let err = TopologyError::PortClassMismatch {
            port: 46,
            class: "fiber",
            panel_kind: "patch",
        };
        assert_eq!(
            err.to_string(),
            "port 46 is fiber class and cannot bind to a patch panel"
        );
        assert_eq!(err.kind(), "port_class_mismatch");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let err = TopologyError::JumpChainTooLong { max: 8 };
        assert_eq!(err.kind(), "jump_chain_too_long");
        let err = TopologyError::SlotOverflow {
            rack_id: 1,
            detail: "slot 4 is already occupied".into(),
        };
        assert_eq!(err.kind(), "slot_overflow");
    }
}

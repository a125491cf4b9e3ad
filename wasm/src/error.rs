use wasm_bindgen::JsValue;

use crate::renderer::buffer::TargetKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("{kind:?} framebuffer incomplete (status 0x{status:04x})")]
    IncompleteFramebuffer { kind: TargetKind, status: u32 },

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("Invalid mesh parameters: {0}")]
    InvalidMesh(String),

    #[error("Invalid target size {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JS error: {0}")]
    Js(String),
}

impl RenderError {
    pub fn environment<T: ToString>(msg: T) -> Self {
        RenderError::Environment(msg.to_string())
    }

    pub fn shader<T: ToString>(msg: T) -> Self {
        RenderError::Shader(msg.to_string())
    }

    pub fn resource<T: ToString>(msg: T) -> Self {
        RenderError::Resource(msg.to_string())
    }

    /// Whether the error aborts setup rather than a single frame
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Environment(_)
                | RenderError::IncompleteFramebuffer { .. }
                | RenderError::Shader(_)
                | RenderError::Resource(_)
        )
    }

    fn category(&self) -> &'static str {
        match self {
            RenderError::Environment(_) => "Environment",
            RenderError::IncompleteFramebuffer { .. } => "Framebuffer",
            RenderError::Shader(_) => "Shader",
            RenderError::Resource(_) => "Resource",
            RenderError::SingularMatrix => "Math",
            RenderError::InvalidMesh(_) => "Mesh",
            RenderError::InvalidTarget { .. } => "Target",
            RenderError::InvalidConfig(_) => "Config",
            RenderError::Js(_) => "JS",
        }
    }
}

impl From<JsValue> for RenderError {
    fn from(value: JsValue) -> Self {
        RenderError::Js(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
    }
}

impl From<RenderError> for JsValue {
    fn from(err: RenderError) -> Self {
        JsValue::from_str(&format!("[{}] {}", err.category(), err))
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RenderError::environment("context lost").is_fatal());
        assert!(RenderError::IncompleteFramebuffer {
            kind: TargetKind::Refraction,
            status: 0x8cd6,
        }
        .is_fatal());
        assert!(!RenderError::SingularMatrix.is_fatal());
        assert!(!RenderError::InvalidMesh("cell size".into()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = RenderError::IncompleteFramebuffer {
            kind: TargetKind::Reflection,
            status: 0x8cd6,
        };
        assert_eq!(
            err.to_string(),
            "Reflection framebuffer incomplete (status 0x8cd6)"
        );
        assert_eq!(
            RenderError::InvalidTarget { width: 0, height: 10 }.to_string(),
            "Invalid target size 0x10"
        );
    }
}

pub type ScrubResult<T> = Result<T, ScrubError>;

/// Error taxonomy of the compositor.
///
/// Besides configuration problems, only [`ScrubError::Shader`] escapes [`crate::initialize`]. The
/// other classes are recovered or degraded where they occur and merely logged.
#[derive(thiserror::Error, Debug)]
pub enum ScrubError {
    #[error("shader error: {0}")]
    Shader(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScrubError {
    pub fn shader(msg: impl Into<String>) -> Self {
        Self::Shader(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn environment(msg: impl Into<String>) -> Self {
        Self::Environment(msg.into())
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Return `true` for errors that must abort initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Shader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(ScrubError::shader("x").to_string().contains("shader error:"));
        assert!(ScrubError::asset("x").to_string().contains("asset error:"));
        assert!(
            ScrubError::environment("x")
                .to_string()
                .contains("environment error:")
        );
        assert!(
            ScrubError::playback("x")
                .to_string()
                .contains("playback error:")
        );
        assert!(
            ScrubError::validation("x")
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn only_shader_errors_are_fatal() {
        assert!(ScrubError::shader("link").is_fatal());
        assert!(!ScrubError::asset("404").is_fatal());
        assert!(!ScrubError::environment("no gl").is_fatal());
        assert!(!ScrubError::playback("autoplay").is_fatal());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ScrubError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}

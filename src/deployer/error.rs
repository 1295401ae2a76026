#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
    #[error("failed to copy build output: {0}")]
    CopyFailed(String),

    #[error("failed to swap deployment target: {0}")]
    SwapFailed(String),

    #[error("publish task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_cause() {
        let err = DeployerError::CopyFailed("disk full".into());
        assert_eq!(err.to_string(), "failed to copy build output: disk full");
        let err = DeployerError::SwapFailed("permission denied".into());
        assert!(err.to_string().contains("permission denied"));
    }
}

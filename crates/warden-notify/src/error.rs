#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification sink disabled: {sink}")]
    SinkDisabled { sink: String },
    #[error("notification sink missing configuration: {sink} needs {variable}")]
    MissingConfig { sink: String, variable: String },
    #[error("notification sink failed: {message}")]
    SinkFailed { message: String },
}

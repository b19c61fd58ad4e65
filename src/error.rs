use thiserror::Error;

/// Failure taxonomy for the whole service. Handlers map variants onto HTTP
/// status codes; nothing in here retries on its own.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("failed to connect to database: {0}")]
    ConnectionFailure(String),

    #[error("connection '{0}' not found")]
    UnknownConnection(String),

    #[error("query '{0}' not found")]
    UnknownQuery(String),

    #[error("only SELECT queries are allowed")]
    PolicyViolation,

    #[error("{message}")]
    Provider {
        provider: String,
        endpoint: String,
        message: String,
    },

    #[error("invalid model response: {0}")]
    ResponseValidation(String),

    #[error("failed to read schema: {0}")]
    SchemaIntrospection(String),

    #[error("query execution failed: {0}")]
    QueryFailed(String),

    #[error("no data to export")]
    NoData,

    #[error("unsupported database type: {0}")]
    UnsupportedDialect(String),
}

pub type AppResult<T> = Result<T, AppError>;

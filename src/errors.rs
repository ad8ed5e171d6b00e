use std::fmt;

#[derive(Debug, Clone)]
pub enum ResilinkError {
    Validation(String),
    DuplicateCode(String),
    NotFound(String),
    CircuitOpen(String),
    Upstream(String),
    UnsupportedOperation(String),
    PipelineDegraded(String),
    NoNodesAvailable(String),
    Serialization(String),
    Config(String),
}

impl ResilinkError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ResilinkError::Validation(_) => "E001",
            ResilinkError::DuplicateCode(_) => "E002",
            ResilinkError::NotFound(_) => "E003",
            ResilinkError::CircuitOpen(_) => "E004",
            ResilinkError::Upstream(_) => "E005",
            ResilinkError::UnsupportedOperation(_) => "E006",
            ResilinkError::PipelineDegraded(_) => "E007",
            ResilinkError::NoNodesAvailable(_) => "E008",
            ResilinkError::Serialization(_) => "E009",
            ResilinkError::Config(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ResilinkError::Validation(_) => "Validation Error",
            ResilinkError::DuplicateCode(_) => "Duplicate Short Code",
            ResilinkError::NotFound(_) => "Resource Not Found",
            ResilinkError::CircuitOpen(_) => "Circuit Breaker Open",
            ResilinkError::Upstream(_) => "Upstream Failure",
            ResilinkError::UnsupportedOperation(_) => "Unsupported Operation",
            ResilinkError::PipelineDegraded(_) => "Analytics Pipeline Degraded",
            ResilinkError::NoNodesAvailable(_) => "No Nodes Available",
            ResilinkError::Serialization(_) => "Serialization Error",
            ResilinkError::Config(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ResilinkError::Validation(msg) => msg,
            ResilinkError::DuplicateCode(msg) => msg,
            ResilinkError::NotFound(msg) => msg,
            ResilinkError::CircuitOpen(msg) => msg,
            ResilinkError::Upstream(msg) => msg,
            ResilinkError::UnsupportedOperation(msg) => msg,
            ResilinkError::PipelineDegraded(msg) => msg,
            ResilinkError::NoNodesAvailable(msg) => msg,
            ResilinkError::Serialization(msg) => msg,
            ResilinkError::Config(msg) => msg,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ResilinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 默认使用简洁格式
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ResilinkError {}

// 便捷的构造函数
impl ResilinkError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ResilinkError::Validation(msg.into())
    }

    pub fn duplicate_code<T: Into<String>>(msg: T) -> Self {
        ResilinkError::DuplicateCode(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ResilinkError::NotFound(msg.into())
    }

    pub fn circuit_open<T: Into<String>>(msg: T) -> Self {
        ResilinkError::CircuitOpen(msg.into())
    }

    pub fn upstream<T: Into<String>>(msg: T) -> Self {
        ResilinkError::Upstream(msg.into())
    }

    pub fn unsupported_operation<T: Into<String>>(msg: T) -> Self {
        ResilinkError::UnsupportedOperation(msg.into())
    }

    pub fn pipeline_degraded<T: Into<String>>(msg: T) -> Self {
        ResilinkError::PipelineDegraded(msg.into())
    }

    pub fn no_nodes_available<T: Into<String>>(msg: T) -> Self {
        ResilinkError::NoNodesAvailable(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ResilinkError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ResilinkError::Config(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<redis::RedisError> for ResilinkError {
    fn from(err: redis::RedisError) -> Self {
        ResilinkError::Upstream(err.to_string())
    }
}

impl From<std::io::Error> for ResilinkError {
    fn from(err: std::io::Error) -> Self {
        ResilinkError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for ResilinkError {
    fn from(err: serde_json::Error) -> Self {
        ResilinkError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResilinkError>;

/// 自定义错误类型
///
/// 使用 thiserror 定义精确的错误类型，控制面据此把失败渲染为文本，
/// 任何一种错误都只影响出错的单元（一个命令、一个 acceptor 或一个 relay）
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Relay 引擎的主要错误类型
#[derive(Error, Debug)]
pub enum RelayError {
    /// 主机名解析失败
    #[error("Failed to resolve '{host}': {reason}")]
    ResolveFailed { host: String, reason: String },

    /// 监听端口绑定失败
    #[error("Failed to listen on {addr}: {source}")]
    ListenFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 出站连接失败
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// 命令格式错误或缺少参数
    #[error("Usage: {0}")]
    Usage(String),

    /// 目标选择器不是合法的正则表达式
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 对象状态不允许该操作
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// relay 运行时已退出
    #[error("Relay runtime is no longer running")]
    RuntimeUnavailable,

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 其他错误（保留与 anyhow 的兼容性）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// 创建解析失败错误
    pub fn resolve_failed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResolveFailed {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// 创建监听失败错误
    pub fn listen_failed(addr: SocketAddr, source: io::Error) -> Self {
        Self::ListenFailed { addr, source }
    }

    /// 创建连接失败错误
    pub fn connect_failed(addr: SocketAddr, source: io::Error) -> Self {
        Self::ConnectFailed { addr, source }
    }

    /// 创建用法错误
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// 创建状态错误
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 创建配置错误
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// 检查是否为用法错误（包括非法的选择器）
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::InvalidPattern { .. })
    }

    /// 检查是否为解析失败
    pub fn is_resolve_failed(&self) -> bool {
        matches!(self, Self::ResolveFailed { .. })
    }

    /// 检查是否为监听失败
    pub fn is_listen_failed(&self) -> bool {
        matches!(self, Self::ListenFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_failed_message() {
        let err = RelayError::resolve_failed("storage.example", "no A record");
        assert!(err.is_resolve_failed());
        assert_eq!(
            err.to_string(),
            "Failed to resolve 'storage.example': no A record"
        );
    }

    #[test]
    fn test_listen_failed() {
        let addr: SocketAddr = "127.0.0.1:3677".parse().unwrap();
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err = RelayError::listen_failed(addr, io_err);
        assert!(err.is_listen_failed());
        assert!(err.to_string().contains("127.0.0.1:3677"));
    }

    #[test]
    fn test_invalid_pattern_is_usage() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = RelayError::InvalidPattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.is_usage());
        assert!(RelayError::usage("report").is_usage());
        assert!(!RelayError::invalid_state("stopped").is_usage());
    }

    #[test]
    fn test_connection_failed() {
        let addr: SocketAddr = "10.0.0.1:80".parse().unwrap();
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = RelayError::connect_failed(addr, io_err);
        assert!(err.to_string().contains("Failed to connect"));
        assert!(err.to_string().contains("10.0.0.1:80"));
    }
}

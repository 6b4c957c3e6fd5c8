use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// 字节流连接抽象
///
/// Relay 只依赖读、写和关闭（drop / shutdown），不关心底层是 TCP 还是内存管道
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

// 为所有满足条件的类型自动实现 Transport
impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// 装箱后的连接，Relay 启动前暂存两端
pub type BoxedTransport = Box<dyn Transport>;

/// Relay 的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegSide {
    /// 面向被测客户端（acceptor 接受的连接）
    Client,
    /// 面向真实服务器（出站连接）
    Server,
}

impl LegSide {
    /// 另一侧
    pub fn opposite(self) -> Self {
        match self {
            LegSide::Client => LegSide::Server,
            LegSide::Server => LegSide::Client,
        }
    }

    /// 写入该侧时数据流动的方向名称
    pub fn direction(self) -> &'static str {
        match self {
            LegSide::Client => "down",
            LegSide::Server => "up",
        }
    }
}

impl fmt::Display for LegSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegSide::Client => write!(f, "client"),
            LegSide::Server => write!(f, "server"),
        }
    }
}

impl std::str::FromStr for LegSide {
    type Err = anyhow::Error;

    /// 接受侧名称或方向名称：`client`/`down` 与 `server`/`up`
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "client" | "down" => Ok(Self::Client),
            "server" | "up" => Ok(Self::Server),
            _ => anyhow::bail!("Unknown relay direction: {}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_side_parse() {
        assert_eq!("up".parse::<LegSide>().unwrap(), LegSide::Server);
        assert_eq!("DOWN".parse::<LegSide>().unwrap(), LegSide::Client);
        assert_eq!("client".parse::<LegSide>().unwrap(), LegSide::Client);
        assert!("sideways".parse::<LegSide>().is_err());
    }

    #[test]
    fn test_leg_side_opposite() {
        assert_eq!(LegSide::Client.opposite(), LegSide::Server);
        assert_eq!(LegSide::Server.direction(), "up");
        assert_eq!(LegSide::Client.to_string(), "client");
    }

    #[test]
    fn test_duplex_is_transport() {
        fn assert_transport<T: Transport>(_: &T) {}
        let (a, _b) = tokio::io::duplex(64);
        assert_transport(&a);
        let boxed: BoxedTransport = Box::new(a);
        assert_transport(&boxed);
    }
}

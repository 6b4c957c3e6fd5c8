/// TCP Relay 库入口
///
/// 将核心模块导出为库，方便测试和复用
pub mod acceptor;
pub mod cli;
pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod rate_limiter;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod runner;
pub mod stats;
pub mod transport;

// 重新导出常用类型
pub use acceptor::{Acceptor, AcceptorState, RelaySink};
pub use config::{AppConfig, RelaySettings};
pub use control::{Command, ControlPlane, Selector};
pub use error::{RelayError, Result};
pub use rate_limiter::RateLimiter;
pub use registry::Registry;
pub use relay::{Leg, Relay, RelayOptions};
pub use resolver::{Resolver, SystemResolver};
pub use runner::RelayRunner;
pub use stats::{AcceptorStats, RelayStats, StatsSummary};
pub use transport::{LegSide, Transport};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tcp-relay")]
#[command(author, version, about = "Controllable TCP relay harness for multi-source download testing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动 relay 引擎并进入交互控制台
    Run {
        /// 配置文件路径（省略时使用默认配置）
        #[arg(short, long)]
        config: Option<String>,

        /// 覆盖端口计数器初始值
        #[arg(long, value_name = "PORT")]
        next_port: Option<u16>,

        /// 启动后立即执行 adddefaultrelays
        #[arg(long)]
        default_relays: bool,

        /// 进入控制台前依次执行的命令（可重复）
        #[arg(short = 'e', long = "exec", value_name = "COMMAND")]
        exec: Vec<String>,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,

        /// 输出格式 (text, json)
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// 生成带注释的配置模板
    Template {
        /// 输出文件路径（省略时打印到标准输出）
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "tcp-relay",
            "run",
            "--next-port",
            "4000",
            "--default-relays",
            "-e",
            "relayspeed all 1000",
            "-e",
            "report",
        ]);
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run {
                config,
                next_port,
                default_relays,
                exec,
            } => {
                assert!(config.is_none());
                assert_eq!(next_port, Some(4000));
                assert!(default_relays);
                assert_eq!(exec, vec!["relayspeed all 1000", "report"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_and_log_level() {
        let cli = Cli::parse_from(["tcp-relay", "check", "-c", "relay.toml", "--log-level", "debug"]);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Commands::Check { ref config, ref format } if config == "relay.toml" && format == "text"
        ));
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["tcp-relay", "check", "-c", "x", "-f", "yaml"]).is_err());
    }
}

use super::selector::Selector;
use crate::error::{RelayError, Result};
use crate::transport::LegSide;

/// `help` 输出
pub const HELP_TEXT: &str = "\
Commands:
  addrelay <server[:port]>                  listen on the next port, relaying to server
  adddefaultrelays                          addrelay for every configured default server
  nextport [port]                           show or set the port used by the next addrelay
  closeacceptor <all|pattern>               stop accepting on matching acceptors
  openacceptor <all|pattern>                restart matching stopped acceptors
  closerelay <all|pattern>                  close matching relays immediately
  pauserelay <all|pattern> [0|1] [up|down]  pause (1, default) or resume (0) matching relays
  relayspeed <all|pattern> <bytes/s>        cap matching relays, 0 for unlimited
  acceptorspeed <all|pattern> <bytes/s>     cap relays spawned later by matching acceptors
  report [json]                             per-relay totals and state
  acceptors                                 list acceptors
  getcode                                   client code redirecting servers to local ports
  help | ?                                  this text
  exit                                      shut down";

/// 控制台命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddRelay { server: String },
    AddDefaultRelays,
    NextPort(Option<u16>),
    CloseAcceptor(Selector),
    OpenAcceptor(Selector),
    CloseRelay(Selector),
    PauseRelay {
        selector: Selector,
        paused: bool,
        /// None 表示两个方向
        side: Option<LegSide>,
    },
    RelaySpeed {
        selector: Selector,
        bytes_per_second: u64,
    },
    AcceptorSpeed {
        selector: Selector,
        bytes_per_second: u64,
    },
    Report { json: bool },
    Acceptors,
    GetCode,
    Help,
    Exit,
}

impl Command {
    /// 解析一行命令，空行返回 None
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        Self::from_words(&words).map(Some)
    }

    /// 从已分词的参数解析
    pub fn from_words(words: &[&str]) -> Result<Self> {
        let (name, args) = words
            .split_first()
            .ok_or_else(|| RelayError::usage("empty command"))?;

        let command = match name.to_lowercase().as_str() {
            "addrelay" => {
                expect_args(args, 1, 1, "addrelay <server[:port]>")?;
                Command::AddRelay {
                    server: args[0].to_string(),
                }
            }
            "adddefaultrelays" => {
                expect_args(args, 0, 0, "adddefaultrelays")?;
                Command::AddDefaultRelays
            }
            "nextport" => {
                expect_args(args, 0, 1, "nextport [port]")?;
                match args.first() {
                    Some(text) => Command::NextPort(Some(parse_port(text)?)),
                    None => Command::NextPort(None),
                }
            }
            "closeacceptor" => {
                expect_args(args, 1, 1, "closeacceptor <all|pattern>")?;
                Command::CloseAcceptor(Selector::parse(args[0])?)
            }
            "openacceptor" => {
                expect_args(args, 1, 1, "openacceptor <all|pattern>")?;
                Command::OpenAcceptor(Selector::parse(args[0])?)
            }
            "closerelay" => {
                expect_args(args, 1, 1, "closerelay <all|pattern>")?;
                Command::CloseRelay(Selector::parse(args[0])?)
            }
            "pauserelay" => parse_pause(args)?,
            "relayspeed" => {
                const USAGE: &str = "relayspeed <all|pattern> <bytes/s>";
                expect_args(args, 2, 2, USAGE)?;
                Command::RelaySpeed {
                    selector: Selector::parse(args[0])?,
                    bytes_per_second: parse_speed(args[1], USAGE)?,
                }
            }
            "acceptorspeed" => {
                const USAGE: &str = "acceptorspeed <all|pattern> <bytes/s>";
                expect_args(args, 2, 2, USAGE)?;
                Command::AcceptorSpeed {
                    selector: Selector::parse(args[0])?,
                    bytes_per_second: parse_speed(args[1], USAGE)?,
                }
            }
            "report" => {
                expect_args(args, 0, 1, "report [json]")?;
                match args.first() {
                    None => Command::Report { json: false },
                    Some(arg) if arg.eq_ignore_ascii_case("json") => Command::Report { json: true },
                    Some(_) => return Err(RelayError::usage("report [json]")),
                }
            }
            "acceptors" => {
                expect_args(args, 0, 0, "acceptors")?;
                Command::Acceptors
            }
            "getcode" => {
                expect_args(args, 0, 0, "getcode")?;
                Command::GetCode
            }
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => {
                return Err(RelayError::usage(format!(
                    "unknown command '{}', type 'help' for a list",
                    other
                )))
            }
        };
        Ok(command)
    }
}

fn expect_args(args: &[&str], min: usize, max: usize, usage: &str) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(RelayError::usage(usage));
    }
    Ok(())
}

fn parse_port(text: &str) -> Result<u16> {
    match text.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(RelayError::usage("nextport [port], port in 1-65535")),
    }
}

fn parse_speed(text: &str, usage: &str) -> Result<u64> {
    text.parse::<u64>().map_err(|_| RelayError::usage(usage))
}

/// `pauserelay <sel> [0|1] [up|down]`，两个可选参数顺序不限
fn parse_pause(args: &[&str]) -> Result<Command> {
    const USAGE: &str = "pauserelay <all|pattern> [0|1] [up|down]";
    expect_args(args, 1, 3, USAGE)?;

    let selector = Selector::parse(args[0])?;
    let mut paused = None;
    let mut side = None;
    for arg in &args[1..] {
        match *arg {
            "0" | "1" if paused.is_none() => paused = Some(*arg == "1"),
            _ if side.is_none() => {
                side = Some(
                    arg.parse::<LegSide>()
                        .map_err(|_| RelayError::usage(USAGE))?,
                )
            }
            _ => return Err(RelayError::usage(USAGE)),
        }
    }

    Ok(Command::PauseRelay {
        selector,
        paused: paused.unwrap_or(true),
        side,
    })
}

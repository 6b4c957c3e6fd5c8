/// 控制台模块
///
/// 读线程把输入拆成行，主循环以短超时等待，
/// 这样 Ctrl+C 或 `exit` 触发的退出无需再输入一行即可生效
use crate::runner::RelayRunner;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

pub const PROMPT: &str = "TCPRELAY> ";

/// 输入轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 读取 `input` 的每一行并交给 runner 执行，直到退出请求或输入结束
pub fn run<R, W>(runner: &RelayRunner, input: R, output: &mut W) -> Result<()>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Console input error: {}", e);
                        break;
                    }
                }
            }
            // tx 在此 drop，控制台随之看到输入结束
        })
        .context("Failed to spawn console input thread")?;

    prompt(output)?;
    loop {
        if runner.registry().exit_requested() {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                let text = runner.execute_line(&line);
                if !text.is_empty() {
                    writeln!(output, "{}", text).context("Failed to write console output")?;
                }
                if runner.registry().exit_requested() {
                    break;
                }
                prompt(output)?;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Console input closed");
                runner.registry().request_exit();
                break;
            }
        }
    }
    Ok(())
}

/// 使用标准输入输出运行控制台
pub fn run_stdio(runner: &RelayRunner) -> Result<()> {
    let stdin = std::io::BufReader::new(std::io::stdin());
    let mut stdout = std::io::stdout();
    run(runner, stdin, &mut stdout)
}

fn prompt<W: Write>(output: &mut W) -> Result<()> {
    write!(output, "{}", PROMPT).context("Failed to write console prompt")?;
    output.flush().context("Failed to flush console output")
}

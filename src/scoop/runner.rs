//! 子进程执行：流式读取输出、响应取消与超时。
//!
//! 每次调用 spawn 一个全新进程，句柄只属于这一次调用；任何退出路径
//! （正常、取消、超时）都会回收进程，不留孤儿。

use super::error::ScoopError;
use super::parser::clean_terminal_output;
use super::types::{CommandOutput, OutputLine};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 取消后先等进程自行退出的宽限期，超过则升级 SIGTERM
const CANCEL_GRACE: Duration = Duration::from_secs(5);
/// SIGTERM 之后再等这么久仍不退出就 SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(6);

/// 每条命令独立的取消句柄。
/// 句柄可以在命令排队时就触发；子进程启动后会立刻收到终止信号。
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    pid: AtomicU32,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消；若子进程已启动则立即向整棵进程树发出温和的终止信号
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let pid = self.inner.pid.load(Ordering::SeqCst);
        if pid != 0 {
            interrupt_process_tree(pid);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn attach(&self, pid: u32) {
        self.inner.pid.store(pid, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.inner.pid.store(0, Ordering::SeqCst);
    }
}

/// 执行外部命令的抽象，外观层经由它调用子进程；
/// 测试用仪表化的假实现替换真实进程。
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        argv: &[String],
        cancel: &CancelHandle,
        deadline: Option<Duration>,
        lines: &mpsc::UnboundedSender<OutputLine>,
    ) -> Result<CommandOutput, ScoopError>;
}

/// 真实子进程执行器
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        argv: &[String],
        cancel: &CancelHandle,
        deadline: Option<Duration>,
        lines: &mpsc::UnboundedSender<OutputLine>,
    ) -> Result<CommandOutput, ScoopError> {
        let (program, args) = argv.split_first().ok_or_else(|| ScoopError::Launch {
            program: String::new(),
            message: "命令不能为空".to_string(),
        })?;

        if cancel.is_cancelled() {
            return Err(ScoopError::Cancelled);
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        configure_platform(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| ScoopError::Launch {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let pid = child.id();
        cancel.attach(pid);
        // 竞争窗口：spawn 期间调用方可能已请求取消，补发终止信号
        if cancel.is_cancelled() {
            interrupt_process_tree(pid);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let tx_out = lines.clone();
        let stdout_handle = std::thread::spawn(move || read_stream_lines(stdout, &tx_out, false));
        let tx_err = lines.clone();
        let stderr_handle = std::thread::spawn(move || read_stream_lines(stderr, &tx_err, true));

        let outcome = wait_child(&mut child, cancel, deadline);

        let all_stdout = stdout_handle.join().unwrap_or_default();
        let all_stderr = stderr_handle.join().unwrap_or_default();
        cancel.detach();

        match outcome {
            Wait::Exited(status) => Ok(CommandOutput {
                stdout: all_stdout,
                stderr: all_stderr,
                code: status.code(),
                success: status.success(),
            }),
            Wait::Cancelled => Err(ScoopError::Cancelled),
            Wait::TimedOut(limit) => Err(ScoopError::Timeout(limit)),
        }
    }
}

enum Wait {
    Exited(ExitStatus),
    Cancelled,
    TimedOut(Duration),
}

/// 轮询等待子进程退出，同时响应取消与超时。
/// 取消路径上的信号阶梯：温和终止（cancel() 已发出）→ 宽限期后
/// SIGTERM → 再超时 SIGKILL；超时路径直接强制终止。
fn wait_child(child: &mut Child, cancel: &CancelHandle, deadline: Option<Duration>) -> Wait {
    let started = Instant::now();
    let mut cancel_seen: Option<Instant> = None;
    let mut terminated = false;
    let mut killed = false;

    loop {
        // 先看取消标志再看退出状态，避免"信号已生效、进程刚退出"
        // 的窗口被误报成正常结束
        if cancel.is_cancelled() && cancel_seen.is_none() {
            cancel_seen = Some(Instant::now());
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                return if cancel_seen.is_some() {
                    Wait::Cancelled
                } else {
                    Wait::Exited(status)
                };
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("等待子进程失败: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return Wait::Cancelled;
            }
        }

        if let Some(t0) = cancel_seen {
            if !terminated && t0.elapsed() >= CANCEL_GRACE {
                terminate_process_tree(child.id());
                terminated = true;
            }
            if terminated && !killed && t0.elapsed() >= KILL_GRACE {
                force_kill(child);
                killed = true;
            }
        } else if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                force_kill(child);
                let _ = child.wait();
                return Wait::TimedOut(limit);
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

/// 从流中按行读取并转发到 channel。
/// `\n` 行作为 Stdout / Stderr 发送并计入汇总文本；
/// `\r` 行（下载进度条的就地刷新）作为 Progress 发送，不计入汇总。
fn read_stream_lines(
    stream: Option<impl Read>,
    tx: &mpsc::UnboundedSender<OutputLine>,
    is_stderr: bool,
) -> String {
    let mut result = String::new();
    let Some(mut reader) = stream else {
        return result;
    };

    let mut buffer = [0u8; 1024];
    let mut line_buffer = String::new();

    while let Ok(n) = reader.read(&mut buffer) {
        if n == 0 {
            break;
        }
        let chunk = String::from_utf8_lossy(&buffer[..n]);
        for c in chunk.chars() {
            match c {
                '\n' => {
                    flush_line(&mut line_buffer, tx, is_stderr, &mut result);
                }
                '\r' => {
                    let cleaned = clean_terminal_output(&line_buffer);
                    if !cleaned.trim().is_empty() {
                        let _ = tx.send(OutputLine::Progress(cleaned));
                    }
                    line_buffer.clear();
                }
                _ => line_buffer.push(c),
            }
        }
    }
    if !line_buffer.is_empty() {
        flush_line(&mut line_buffer, tx, is_stderr, &mut result);
    }
    result
}

fn flush_line(
    line_buffer: &mut String,
    tx: &mpsc::UnboundedSender<OutputLine>,
    is_stderr: bool,
    result: &mut String,
) {
    let cleaned = clean_terminal_output(line_buffer);
    if !cleaned.trim().is_empty() {
        let line = if is_stderr {
            OutputLine::Stderr(cleaned.clone())
        } else {
            OutputLine::Stdout(cleaned.clone())
        };
        let _ = tx.send(line);
        result.push_str(&cleaned);
        result.push('\n');
    }
    line_buffer.clear();
}

// ========== 平台相关 ==========

#[cfg(unix)]
fn configure_platform(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(|| {
            // 独立进程组，便于整树终止；父进程退出时子进程收到 SIGTERM
            libc::setpgid(0, 0);
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
            Ok(())
        });
    }
}

#[cfg(windows)]
fn configure_platform(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    // 不弹出控制台窗口
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(unix)]
fn signal_process_group(pid: u32, sig: libc::c_int) {
    unsafe {
        libc::kill(-(pid as i32), sig);
    }
}

/// 温和终止：SIGINT（让工具有机会自行收尾）/ taskkill 不带 /F
#[cfg(unix)]
fn interrupt_process_tree(pid: u32) {
    signal_process_group(pid, libc::SIGINT);
}

#[cfg(windows)]
fn interrupt_process_tree(pid: u32) {
    taskkill(pid, false);
}

#[cfg(unix)]
fn terminate_process_tree(pid: u32) {
    signal_process_group(pid, libc::SIGTERM);
}

#[cfg(windows)]
fn terminate_process_tree(pid: u32) {
    taskkill(pid, true);
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) {
    // Windows 没有信号，taskkill /T 终止整棵进程树
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    let _ = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status();
}

fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    signal_process_group(child.id(), libc::SIGKILL);
    #[cfg(windows)]
    taskkill(child.id(), true);
    let _ = child.kill();
}

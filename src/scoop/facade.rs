//! 命令外观：串行化队列、目录缓存与进度流。
//!
//! 同一时刻最多只有一个外部进程在执行（scoop 不支持并发修改包数据
//! 库）；后到的命令按先来先服务排队，而不是被拒绝。单条命令失败不
//! 影响队列里的后续命令。

use super::catalog::PackageCatalog;
use super::error::ScoopError;
use super::parser::{parse_installed_list, parse_search_results};
use super::runner::{CancelHandle, CommandRunner, ProcessRunner};
use super::types::{CommandKind, CommandOutput, CommandStatus, OutputLine, PackageRecord};
use super::Scoop;
use crate::config::Config;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// 排队中的一次调用
struct Job {
    kind: CommandKind,
    cancel: CancelHandle,
    status: Arc<AtomicU8>,
    lines: mpsc::UnboundedSender<OutputLine>,
    reply: oneshot::Sender<Result<Vec<PackageRecord>, ScoopError>>,
}

/// 一次已提交命令的句柄：可取消、可读进度行、可等待最终结果
pub struct Pending {
    cancel: CancelHandle,
    status: Arc<AtomicU8>,
    lines: mpsc::UnboundedReceiver<OutputLine>,
    reply: oneshot::Receiver<Result<Vec<PackageRecord>, ScoopError>>,
}

impl Pending {
    /// 取出可独立持有的取消句柄
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// 取消这条命令：排队中则不会启动子进程，执行中则终止子进程
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> CommandStatus {
        CommandStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// 下一条实时输出行；命令结束后返回 None
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// 等待命令完成。列表 / 搜索返回记录；变更类命令成功时返回空 Vec
    pub async fn wait(self) -> Result<Vec<PackageRecord>, ScoopError> {
        match self.reply.await {
            Ok(result) => result,
            Err(_) => Err(ScoopError::Closed),
        }
    }
}

/// Scoop 命令外观。
/// 每个进程构造一个实例并按引用传给展示层；内部没有任何全局状态。
/// 构造需要在 tokio 运行时内（会 spawn 工作任务）。
pub struct Facade {
    jobs: mpsc::UnboundedSender<Job>,
    catalog: Arc<RwLock<PackageCatalog>>,
}

impl Facade {
    /// 使用真实子进程执行器构造
    pub fn new(scoop: Scoop, config: &Config) -> Self {
        Self::with_runner(scoop, config, Arc::new(ProcessRunner))
    }

    /// 注入自定义执行器（测试用仪表化假执行器走这里）
    pub fn with_runner(scoop: Scoop, config: &Config, runner: Arc<dyn CommandRunner>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let catalog = Arc::new(RwLock::new(PackageCatalog::new(config.search_cache_size)));
        let timeout = config.timeout_secs.map(Duration::from_secs);
        tokio::spawn(worker_loop(
            scoop,
            runner,
            jobs_rx,
            Arc::clone(&catalog),
            timeout,
        ));
        Self {
            jobs: jobs_tx,
            catalog,
        }
    }

    /// 提交一条命令，立即返回句柄；命令在队列中按提交顺序执行
    pub fn submit(&self, kind: CommandKind) -> Pending {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let cancel = CancelHandle::new();
        let status = Arc::new(AtomicU8::new(CommandStatus::Queued.as_u8()));

        let job = Job {
            kind,
            cancel: cancel.clone(),
            status: Arc::clone(&status),
            lines: line_tx,
            reply: reply_tx,
        };
        if self.jobs.send(job).is_err() {
            // 工作任务已退出；wait() 会得到 Closed
            log::error!("命令队列已关闭，无法提交命令");
        }

        Pending {
            cancel,
            status,
            lines: line_rx,
            reply: reply_rx,
        }
    }

    // ===== 便捷方法 =====

    /// 拉取已安装包列表（总是执行一次外部调用）
    pub async fn list_installed(&self) -> Result<Vec<PackageRecord>, ScoopError> {
        self.submit(CommandKind::List).wait().await
    }

    /// 已安装列表：缓存快照有效时直接返回，失效则重新拉取
    pub async fn installed(&self) -> Result<Vec<PackageRecord>, ScoopError> {
        if let Some(records) = self.cached_installed() {
            return Ok(records);
        }
        self.list_installed().await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<PackageRecord>, ScoopError> {
        self.submit(CommandKind::Search(query.to_string()))
            .wait()
            .await
    }

    pub async fn install(&self, name: &str) -> Result<(), ScoopError> {
        self.submit(CommandKind::Install(name.to_string()))
            .wait()
            .await
            .map(|_| ())
    }

    pub async fn update(&self, name: &str) -> Result<(), ScoopError> {
        self.submit(CommandKind::Update(name.to_string()))
            .wait()
            .await
            .map(|_| ())
    }

    pub async fn uninstall(&self, name: &str) -> Result<(), ScoopError> {
        self.submit(CommandKind::Uninstall(name.to_string()))
            .wait()
            .await
            .map(|_| ())
    }

    pub async fn cleanup(&self, name: &str) -> Result<(), ScoopError> {
        self.submit(CommandKind::Cleanup(name.to_string()))
            .wait()
            .await
            .map(|_| ())
    }

    // ===== 非阻塞缓存读取 =====

    /// 当前缓存的已安装快照；None 表示尚未拉取或已失效
    pub fn cached_installed(&self) -> Option<Vec<PackageRecord>> {
        self.catalog
            .read()
            .ok()?
            .installed()
            .map(|records| records.to_vec())
    }

    /// 查询搜索缓存（命中会提升为最近使用，因此需要写锁）
    pub fn cached_search(&self, query: &str) -> Option<Vec<PackageRecord>> {
        self.catalog
            .write()
            .ok()?
            .search(query)
            .map(|records| records.to_vec())
    }
}

/// 工作任务：逐条取出命令并执行。
/// 目录缓存只在这里写入；阻塞的子进程 I/O 交给 spawn_blocking。
async fn worker_loop(
    scoop: Scoop,
    runner: Arc<dyn CommandRunner>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    catalog: Arc<RwLock<PackageCatalog>>,
    timeout: Option<Duration>,
) {
    while let Some(job) = jobs.recv().await {
        let Job {
            kind,
            cancel,
            status,
            lines,
            reply,
        } = job;

        // 排队期间已取消：不启动子进程，目录保持原样
        if cancel.is_cancelled() {
            status.store(CommandStatus::Cancelled.as_u8(), Ordering::SeqCst);
            let _ = reply.send(Err(ScoopError::Cancelled));
            continue;
        }

        status.store(CommandStatus::Running.as_u8(), Ordering::SeqCst);
        match kind.argument() {
            Some(arg) => log::info!("$ scoop {} {}", kind.verb(), arg),
            None => log::info!("$ scoop {}", kind.verb()),
        }

        let argv = scoop.argv(&kind);
        let runner_task = Arc::clone(&runner);
        let cancel_task = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            runner_task.run(&argv, &cancel_task, timeout, &lines)
        })
        .await
        .unwrap_or_else(|e| {
            log::error!("执行任务异常退出: {}", e);
            Err(ScoopError::Closed)
        });

        let result = finish(&kind, outcome, &catalog);
        let terminal = match &result {
            Ok(_) => CommandStatus::Succeeded,
            Err(ScoopError::Cancelled) => CommandStatus::Cancelled,
            Err(_) => CommandStatus::Failed,
        };
        status.store(terminal.as_u8(), Ordering::SeqCst);
        let _ = reply.send(result);
    }
}

/// 根据命令种类处理执行结果：解析输出、提交或失效目录快照。
/// 失败与取消都不触碰目录——快照要么整体替换，要么保持原样。
fn finish(
    kind: &CommandKind,
    outcome: Result<CommandOutput, ScoopError>,
    catalog: &Arc<RwLock<PackageCatalog>>,
) -> Result<Vec<PackageRecord>, ScoopError> {
    let output = outcome?;
    if !output.success {
        log::debug!("命令失败，完整输出:\n{}", output.combined_output());
        return Err(ScoopError::Execution {
            code: output.code,
            stderr: output.stderr,
        });
    }

    match kind {
        CommandKind::List => {
            let records = parse_installed_list(&output.stdout).ok_or(ScoopError::Parse)?;
            if let Ok(mut catalog) = catalog.write() {
                catalog.set_installed(records.clone());
            }
            Ok(records)
        }
        CommandKind::Search(query) => {
            let records = parse_search_results(&output.stdout);
            if let Ok(mut catalog) = catalog.write() {
                catalog.set_search(query.clone(), records.clone());
            }
            Ok(records)
        }
        _ => {
            // 变更类命令成功：只失效快照，不从输出文本推断新状态
            if let Ok(mut catalog) = catalog.write() {
                catalog.invalidate_installed();
            }
            Ok(Vec::new())
        }
    }
}

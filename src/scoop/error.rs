//! 错误类型定义

use std::time::Duration;
use thiserror::Error;

/// Scoop 命令执行过程中可能出现的错误。
/// 调用失败只影响当前这一条命令，队列中的后续命令照常执行。
#[derive(Debug, Error)]
pub enum ScoopError {
    /// 无法启动外部进程（未安装、不在 PATH、无权限）
    #[error("无法启动 {program}: {message}")]
    Launch { program: String, message: String },

    /// 工具运行后返回非零退出码；stderr 原样保留
    #[error("scoop 命令失败 (exit={code:?}): {stderr}")]
    Execution { code: Option<i32>, stderr: String },

    /// 工具报告成功但输出无法解析出任何记录
    /// （与"合法的空列表"严格区分）
    #[error("无法解析 scoop 输出")]
    Parse,

    /// 命令被调用方取消（排队中或执行中）
    #[error("命令已取消")]
    Cancelled,

    /// 超过调用方设定的时限，子进程已被终止回收
    #[error("命令超时 ({0:?})")]
    Timeout(Duration),

    /// 外观的工作任务已退出，不再接受命令
    #[error("命令队列已关闭")]
    Closed,
}

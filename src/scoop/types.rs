//! Scoop 外观层相关数据类型定义

use std::fmt;

/// 命令输出结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// 一条包记录（安装列表或搜索结果中的一行）。
/// 记录是不可变值对象：一次新的列表会整体替换旧记录，而不是原地修改。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    /// 版本字符串，不假定可按语义化版本比较
    pub version: String,
    /// 来源 bucket，可能为空
    pub source: String,
    /// 安装 / 更新时间（尽力解析，可能为空）
    pub updated: String,
    /// 附加信息；搜索结果中为可执行文件列表
    pub info: String,
    /// 工具报告有新版本可用时为 Some
    pub update_available: Option<String>,
}

/// 一次外部命令调用的类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    List,
    Search(String),
    Install(String),
    Update(String),
    Uninstall(String),
    Cleanup(String),
}

impl CommandKind {
    /// 对应的 scoop 子命令动词（列表走 `scoop export`）
    pub fn verb(&self) -> &'static str {
        match self {
            CommandKind::List => "export",
            CommandKind::Search(_) => "search",
            CommandKind::Install(_) => "install",
            CommandKind::Update(_) => "update",
            CommandKind::Uninstall(_) => "uninstall",
            CommandKind::Cleanup(_) => "cleanup",
        }
    }

    pub fn argument(&self) -> Option<&str> {
        match self {
            CommandKind::List => None,
            CommandKind::Search(arg)
            | CommandKind::Install(arg)
            | CommandKind::Update(arg)
            | CommandKind::Uninstall(arg)
            | CommandKind::Cleanup(arg) => Some(arg),
        }
    }

    /// 是否会修改包数据库（成功后需要失效已安装快照）
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            CommandKind::Install(_)
                | CommandKind::Update(_)
                | CommandKind::Uninstall(_)
                | CommandKind::Cleanup(_)
        )
    }
}

/// 命令生命周期状态；终态只会被设置一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl CommandStatus {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            CommandStatus::Queued => 0,
            CommandStatus::Running => 1,
            CommandStatus::Succeeded => 2,
            CommandStatus::Failed => 3,
            CommandStatus::Cancelled => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CommandStatus::Queued,
            1 => CommandStatus::Running,
            2 => CommandStatus::Succeeded,
            4 => CommandStatus::Cancelled,
            _ => CommandStatus::Failed,
        }
    }
}

/// 流式输出行。
/// `Progress` 对应 `\r` 就地刷新的进度行（下载进度条等），不计入日志文本。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
    Progress(String),
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLine::Stdout(line) => write!(f, "{}", line),
            OutputLine::Stderr(line) => write!(f, "⚠ {}", line),
            OutputLine::Progress(line) => write!(f, "{}", line),
        }
    }
}

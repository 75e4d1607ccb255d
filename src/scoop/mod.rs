//! Scoop 包管理器的命令外观层。
//!
//! 模块组织：`runner` 负责子进程执行与流式读取，`parser` 负责把文本
//! 输出转成结构化记录，`facade` 对外提供串行化的异步命令接口，
//! `catalog` 缓存最近一次的列表 / 搜索结果。

pub mod catalog;
pub mod error;
pub mod facade;
pub mod parser;
pub mod runner;
pub mod types;

pub use error::ScoopError;
pub use facade::{Facade, Pending};
pub use runner::{CancelHandle, CommandRunner, ProcessRunner};
pub use types::{CommandKind, CommandOutput, CommandStatus, OutputLine, PackageRecord};

use std::process::Command;

/// Scoop 命令的定位与 PowerShell 参数构造。
/// scoop 本身是 PowerShell 函数，必须经由 pwsh / powershell 调用。
#[derive(Debug, Clone)]
pub struct Scoop {
    pub shell: String,
}

impl Scoop {
    /// 按优先级探测 PowerShell：pwsh（7+）优先，回退 Windows PowerShell
    pub fn detect() -> Self {
        let probe = if cfg!(windows) { "where" } else { "which" };
        for shell in &["pwsh", "powershell"] {
            if Command::new(probe)
                .arg(shell)
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
            {
                return Scoop {
                    shell: shell.to_string(),
                };
            }
        }
        log::warn!("未找到 pwsh / powershell，回退使用 powershell");
        Scoop {
            shell: "powershell".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Scoop {
            shell: shell.into(),
        }
    }

    /// 构造某类命令对应的 PowerShell 命令串。
    /// 列表走 `scoop export`（JSON 输出）；搜索额外接 ConvertTo-Json
    /// 管道，比格式化表格在不同 PowerShell 版本间更稳定。
    /// `6> $null` 丢弃 information 流里的横幅噪声。
    pub fn command_line(&self, kind: &CommandKind) -> String {
        match kind {
            CommandKind::List => {
                "$ErrorActionPreference='Stop'; scoop export 6> $null; exit $LASTEXITCODE"
                    .to_string()
            }
            CommandKind::Search(query) => format!(
                "$ErrorActionPreference='Stop'; scoop search {} 6> $null | ConvertTo-Json -Depth 4; exit $LASTEXITCODE",
                quote_argument(query)
            ),
            CommandKind::Install(name) => mutate_line("install", name),
            CommandKind::Update(name) => mutate_line("update", name),
            CommandKind::Uninstall(name) => mutate_line("uninstall", name),
            CommandKind::Cleanup(name) => mutate_line("cleanup", name),
        }
    }

    /// 完整 argv：shell + 标准参数 + `-Command <命令串>`
    pub fn argv(&self, kind: &CommandKind) -> Vec<String> {
        build_powershell_argv(&self.shell, &self.command_line(kind))
    }
}

fn mutate_line(verb: &str, name: &str) -> String {
    format!(
        "$ErrorActionPreference='Stop'; scoop {} {}; exit $LASTEXITCODE",
        verb,
        quote_argument(name)
    )
}

/// PowerShell 单引号转义：内部单引号写作两个。
/// `*`（全量更新 / 清理）保持裸通配符，不加引号。
fn quote_argument(arg: &str) -> String {
    if arg == "*" {
        return "*".to_string();
    }
    format!("'{}'", arg.replace('\'', "''"))
}

pub fn build_powershell_argv(shell: &str, command: &str) -> Vec<String> {
    vec![
        shell,
        "-NoLogo",
        "-NoProfile",
        "-NonInteractive",
        "-ExecutionPolicy",
        "Bypass",
        "-Command",
        command,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_carries_standard_powershell_flags() {
        let scoop = Scoop::with_shell("pwsh");
        let argv = scoop.argv(&CommandKind::List);
        assert_eq!(argv[0], "pwsh");
        assert!(argv.contains(&"-NonInteractive".to_string()));
        assert!(argv.last().unwrap().contains("scoop export"));
    }

    #[test]
    fn search_pipes_through_convert_to_json() {
        let scoop = Scoop::with_shell("pwsh");
        let line = scoop.command_line(&CommandKind::Search("python".into()));
        assert!(line.contains("scoop search 'python'"));
        assert!(line.contains("ConvertTo-Json"));
    }

    #[test]
    fn single_quotes_are_doubled() {
        let line = mutate_line("install", "it's");
        assert!(line.contains("scoop install 'it''s'"));
    }

    #[test]
    fn wildcard_stays_unquoted() {
        let scoop = Scoop::with_shell("pwsh");
        let line = scoop.command_line(&CommandKind::Update("*".into()));
        assert!(line.contains("scoop update *;"));
    }
}

//! 勺子（shaozi）— Scoop 包管理器的异步命令外观层。
//!
//! 把对 scoop 可执行文件的调用封装为结构化的异步接口：列出已安装包、
//! 搜索仓库、安装 / 更新 / 卸载 / 清理，命令串行执行、可取消、带实时
//! 输出流与内存目录缓存，供 GUI / TUI / CLI 等展示层使用。

pub mod config;
pub mod scoop;

pub use config::Config;
pub use scoop::{
    CancelHandle, CommandKind, Facade, OutputLine, PackageRecord, Pending, Scoop, ScoopError,
};

//! 内存中的包目录缓存

use super::types::PackageRecord;
use std::collections::VecDeque;

/// 最近一次列表 / 搜索结果的内存缓存。
/// 快照只会整体替换，永不部分更新；进程重启后总是从空开始。
#[derive(Debug)]
pub struct PackageCatalog {
    /// 已安装快照；None 表示尚未拉取或已失效
    installed: Option<Vec<PackageRecord>>,
    /// 最近的搜索结果，队首为最近使用
    searches: VecDeque<(String, Vec<PackageRecord>)>,
    capacity: usize,
}

impl PackageCatalog {
    pub fn new(capacity: usize) -> Self {
        Self {
            installed: None,
            searches: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn installed(&self) -> Option<&[PackageRecord]> {
        self.installed.as_deref()
    }

    pub fn set_installed(&mut self, records: Vec<PackageRecord>) {
        self.installed = Some(records);
    }

    /// 使已安装快照失效（变更类命令成功后调用）
    pub fn invalidate_installed(&mut self) {
        self.installed = None;
    }

    /// 查询搜索缓存，命中时提升为最近使用
    pub fn search(&mut self, query: &str) -> Option<&[PackageRecord]> {
        let pos = self.searches.iter().position(|(q, _)| q == query)?;
        if let Some(entry) = self.searches.remove(pos) {
            self.searches.push_front(entry);
        }
        self.searches.front().map(|(_, records)| records.as_slice())
    }

    pub fn set_search(&mut self, query: String, records: Vec<PackageRecord>) {
        if let Some(pos) = self.searches.iter().position(|(q, _)| *q == query) {
            self.searches.remove(pos);
        }
        self.searches.push_front((query, records));
        self.searches.truncate(self.capacity);
    }
}

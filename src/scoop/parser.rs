//! 输出解析函数：把 scoop 的文本输出转成结构化记录。
//!
//! scoop 经由 PowerShell 输出，`export` 与显式 ConvertTo-Json 管道下
//! 优先是 JSON；为抵御格式漂移保留宽容的表格回退解析。解析纯粹是
//! 文本到记录的转换，不做任何 I/O。

use super::types::PackageRecord;
use serde_json::Value;

/// 清理终端输出中的 ANSI 转义序列和特殊字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\r' => {
                if chars.peek() != Some(&'\n') && !result.ends_with('\n') {
                    result.push('\n');
                }
            }
            c if c.is_control() && c != '\n' && c != '\t' => {}
            _ => result.push(c),
        }
    }

    let lines: Vec<&str> = result.lines().collect();
    let mut cleaned_lines = Vec::new();
    let mut prev_empty = false;

    for line in lines {
        let is_empty = line.trim().is_empty();
        if is_empty && prev_empty {
            continue;
        }
        cleaned_lines.push(line);
        prev_empty = is_empty;
    }

    cleaned_lines.join("\n")
}

// ========== JSON 提取 ==========

/// 从混有日志 / 横幅行的文本中提取第一个 JSON 值。
/// 在每个 `{` 或 `[` 处尝试解码，容忍任意非 JSON 前缀。
pub fn extract_first_json_value(text: &str) -> Option<Value> {
    for (i, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }
    None
}

/// 把 JSON 字段值压成展示文本。
/// PowerShell 有时把值序列化成只剩 `ValueKind` 的对象，按空处理。
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => String::new(),
    }
}

/// 按优先级取第一个非空字段（大小写键名都可能出现）
fn field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(value) = obj.get(*key) {
            let text = value_to_text(value);
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// 格式化 scoop 的 Updated 时间戳（通常是 ISO 8601）为展示形式
pub fn format_updated_timestamp(value: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if value.chars().count() >= 19 {
        return value
            .chars()
            .take(19)
            .map(|c| if c == 'T' { ' ' } else { c })
            .collect();
    }
    value.to_string()
}

// ========== 安装列表 ==========

/// 解析 `scoop export` 输出为已安装包列表。
/// 返回 None 表示工具报告了成功、也有可见输出，但一条记录都没解析
/// 出来（格式不匹配）；合法的空列表返回 Some(空 Vec)。
pub fn parse_installed_list(raw: &str) -> Option<Vec<PackageRecord>> {
    if let Some(value) = extract_first_json_value(raw) {
        return parse_export_json(&value);
    }
    parse_installed_table(raw)
}

fn parse_export_json(value: &Value) -> Option<Vec<PackageRecord>> {
    let apps = value.as_object()?.get("apps")?.as_array()?;

    let mut records = Vec::new();
    for item in apps {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let updated_raw = field(obj, &["Updated", "updated"]);
        let update_available = {
            let text = field(obj, &["Latest", "UpdateAvailable"]);
            (!text.is_empty()).then_some(text)
        };
        records.push(PackageRecord {
            name: field(obj, &["Name", "name"]),
            version: field(obj, &["Version", "version"]),
            source: field(obj, &["Source", "source"]),
            updated: format_updated_timestamp(&updated_raw),
            info: field(obj, &["Info", "info"]),
            update_available,
        });
    }
    Some(records)
}

/// 形如版本号的 token：以数字开头，或 `v` / `V` 后跟数字
fn version_like(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('v') | Some('V') => matches!(chars.next(), Some(c) if c.is_ascii_digit()),
        _ => false,
    }
}

/// 表格回退：逐行宽容解析。
/// 表头 / 分隔线 / 横幅按启发式跳过；数据行以**最后一个**形如版本号
/// 的 token 作为名称与版本的分界（包名可以含空格），之后的 token 归
/// 为来源。解析不了的行丢弃并计数，绝不让单行错误拖垮整批。
fn parse_installed_table(raw: &str) -> Option<Vec<PackageRecord>> {
    let text = clean_terminal_output(raw);
    let mut records = Vec::new();
    let mut candidates = 0usize;
    let mut skipped = 0usize;

    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        let lower = s.to_lowercase();
        if lower.starts_with("results from") {
            continue;
        }
        if lower.starts_with("name") && lower.contains("version") {
            continue;
        }
        if s.chars().all(|c| c == '-' || c == ' ') {
            continue;
        }

        candidates += 1;
        let tokens: Vec<&str> = s.split_whitespace().collect();
        match tokens.iter().rposition(|t| version_like(t)) {
            Some(i) if i >= 1 => {
                records.push(PackageRecord {
                    name: tokens[..i].join(" "),
                    version: tokens[i].to_string(),
                    source: tokens[i + 1..].join(" "),
                    ..Default::default()
                });
            }
            _ => {
                skipped += 1;
                log::warn!("跳过无法解析的行: {:?}", s);
            }
        }
    }

    if skipped > 0 {
        log::warn!("安装列表解析共跳过 {} 行", skipped);
    }
    if records.is_empty() && candidates > 0 {
        // 有可见输出却一条都没解析出来，按格式不匹配处理
        return None;
    }
    Some(records)
}

// ========== 搜索结果 ==========

/// 解析 `scoop search` 输出。
/// 首选 ConvertTo-Json 管道产出的 JSON（数组或单个对象）；
/// 回退解析格式化表格（按 ≥2 个空格切列）。
pub fn parse_search_results(raw: &str) -> Vec<PackageRecord> {
    if let Some(value) = extract_first_json_value(raw) {
        return parse_search_json(&value);
    }

    let text = clean_terminal_output(raw);
    let mut results = Vec::new();

    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() {
            continue;
        }
        let lower = s.to_lowercase();
        if lower.starts_with("results from") {
            continue;
        }
        if lower.starts_with("name") && lower.contains("version") && lower.contains("source") {
            continue;
        }
        if s.chars().all(|c| c == '-' || c == ' ') {
            continue;
        }

        let cols = split_columns(s);
        let Some(name) = cols.first().filter(|n| !n.is_empty()) else {
            continue;
        };
        // 预期列序：Name, Version, Source, Binaries（末列可多段）
        results.push(PackageRecord {
            name: name.clone(),
            version: cols.get(1).cloned().unwrap_or_default(),
            source: cols.get(2).cloned().unwrap_or_default(),
            info: if cols.len() >= 4 {
                cols[3..].join("  ")
            } else {
                String::new()
            },
            ..Default::default()
        });
    }

    results
}

fn parse_search_json(value: &Value) -> Vec<PackageRecord> {
    let items: Vec<&Value> = match value {
        Value::Array(list) => list.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };

    let mut results = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let name = field(obj, &["Name", "name"]);
        if name.is_empty() {
            continue;
        }
        results.push(PackageRecord {
            name,
            version: field(obj, &["Version", "version"]),
            source: field(obj, &["Source", "source"]),
            info: field(obj, &["Binaries", "binaries"]),
            ..Default::default()
        });
    }
    results
}

/// 按 ≥2 个连续空白切列；单个空格视作列内空格
fn split_columns(line: &str) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut spaces = 0usize;

    for ch in line.trim().chars() {
        if ch.is_whitespace() {
            spaces += 1;
        } else {
            if spaces >= 2 && !cur.is_empty() {
                cols.push(std::mem::take(&mut cur));
            } else if spaces == 1 && !cur.is_empty() {
                cur.push(' ');
            }
            spaces = 0;
            cur.push(ch);
        }
    }
    if !cur.is_empty() {
        cols.push(cur);
    }
    cols
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- JSON 提取

    #[test]
    fn extract_first_json_value_skips_invalid_prefix() {
        let text = "LOG: start\n{invalid-json\n###\n{\"apps\":[]}";
        let value = extract_first_json_value(text).unwrap();
        assert_eq!(value, serde_json::json!({ "apps": [] }));
    }

    #[test]
    fn extract_first_json_value_none_without_json() {
        assert!(extract_first_json_value("only plain log lines").is_none());
    }

    // ---- 时间戳

    #[test]
    fn format_updated_timestamp_formats_iso_value() {
        assert_eq!(
            format_updated_timestamp("2099-12-31T23:59:58+09:00"),
            "2099-12-31 23:59:58"
        );
    }

    #[test]
    fn format_updated_timestamp_keeps_short_values() {
        assert_eq!(format_updated_timestamp("unknown"), "unknown");
    }

    // ---- 安装列表（JSON）

    #[test]
    fn installed_json_parses_after_noisy_prefix() {
        let text = concat!(
            "INFO: scoop export started\n",
            "{\"apps\":[\"skip-this\",{\"Name\":\"alpha-tool\",\"Version\":101,",
            "\"Source\":\"bucket-a\",\"Updated\":\"2026-02-07T12:34:56+09:00\",",
            "\"Info\":\"Demo package\"}]}"
        );
        let records = parse_installed_list(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alpha-tool");
        assert_eq!(records[0].version, "101");
        assert_eq!(records[0].source, "bucket-a");
        assert_eq!(records[0].updated, "2026-02-07 12:34:56");
        assert_eq!(records[0].info, "Demo package");
        assert_eq!(records[0].update_available, None);
    }

    #[test]
    fn installed_json_rejects_unexpected_structure() {
        assert!(parse_installed_list("{\"items\": []}").is_none());
        assert!(parse_installed_list("{\"apps\": \"not-a-list\"}").is_none());
    }

    #[test]
    fn installed_json_empty_apps_is_a_valid_empty_listing() {
        assert_eq!(parse_installed_list("{\"apps\":[]}").unwrap(), Vec::new());
    }

    #[test]
    fn installed_json_reads_pending_update_version() {
        let text = "{\"apps\":[{\"Name\":\"x\",\"Version\":\"1.0\",\"Latest\":\"2.0\"}]}";
        let records = parse_installed_list(text).unwrap();
        assert_eq!(records[0].update_available.as_deref(), Some("2.0"));
    }

    // ---- 安装列表（表格回退）

    #[test]
    fn installed_table_round_trip() {
        let text =
            "Name    Version   Source\n----    -------   ------\n7zip    23.01     main\ngit     2.43.0    main\n";
        let records = parse_installed_list(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "7zip");
        assert_eq!(records[0].version, "23.01");
        assert_eq!(records[0].source, "main");
        assert_eq!(records[1].name, "git");
        assert_eq!(records[1].version, "2.43.0");
        assert_eq!(records[1].source, "main");
    }

    #[test]
    fn installed_table_drops_malformed_line_keeps_rest() {
        let text = "Name  Version  Source\n7zip  23.01  main\nthis-line-has-no-version\ngit  2.43.0  main\n";
        let records = parse_installed_list(text).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["7zip", "git"]);
    }

    #[test]
    fn installed_table_handles_names_with_spaces() {
        let records = parse_installed_list("my cool app  1.2.0  extras\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "my cool app");
        assert_eq!(records[0].version, "1.2.0");
        assert_eq!(records[0].source, "extras");
    }

    #[test]
    fn installed_table_version_prefixed_with_v() {
        let records = parse_installed_list("nvim  v0.10.2  main\n").unwrap();
        assert_eq!(records[0].version, "v0.10.2");
    }

    #[test]
    fn installed_table_blank_input_is_empty_listing() {
        assert_eq!(parse_installed_list("").unwrap(), Vec::new());
        assert_eq!(parse_installed_list("\n   \n").unwrap(), Vec::new());
    }

    #[test]
    fn installed_table_unparseable_output_is_an_error() {
        assert!(parse_installed_list("garbage output\nmore garbage\n").is_none());
    }

    // ---- 搜索（JSON）

    #[test]
    fn search_json_skips_rows_without_name() {
        let text = concat!(
            "INFO: searching...\n",
            "[{\"Name\":\"alpha-tool\",\"Version\":\"1.2.3\",\"Source\":\"bucket-a\",\"Binaries\":\"alpha.exe\"},",
            "{\"name\":\"beta-archive\",\"version\":\"4.5.6\",\"source\":\"bucket-b\",\"binaries\":\"beta.exe\"},",
            "{\"Version\":\"1.0.0\"}]"
        );
        let results = parse_search_results(text);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "alpha-tool");
        assert_eq!(results[0].info, "alpha.exe");
        assert_eq!(results[1].name, "beta-archive");
        assert_eq!(results[1].source, "bucket-b");
    }

    #[test]
    fn search_json_accepts_single_object() {
        let text =
            "{\"Name\":\"gamma-suite\",\"Version\":\"9.9.9\",\"Source\":\"bucket-c\",\"Binaries\":\"gamma.exe\"}";
        let results = parse_search_results(text);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "gamma-suite");
        assert_eq!(results[0].version, "9.9.9");
    }

    #[test]
    fn search_json_blanks_valuekind_objects_and_joins_lists() {
        let text = concat!(
            "[{\"Name\":\"sample-tool\",\"Version\":{\"ValueKind\":3},",
            "\"Source\":\"sample-bucket\",\"Binaries\":[\"sample.exe\",\"helper.exe\"]}]"
        );
        let results = parse_search_results(text);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].version, "");
        assert_eq!(results[0].source, "sample-bucket");
        assert_eq!(results[0].info, "sample.exe helper.exe");
    }

    // ---- 搜索（表格回退）

    #[test]
    fn search_table_fallback_parses_formatted_table() {
        let text = concat!(
            "\x1b[33mResults from local buckets...\x1b[0m\r\n",
            "Name  Version  Source  Binaries\r\n",
            "----  -------  ------  --------\r\n",
            "delta-tool  0.1.0  bucket-d  delta.exe\r\n",
            "epsilon-pack  0.2.0  bucket-e  epsilon.exe  epsilon-helper.exe\r\n"
        );
        let results = parse_search_results(text);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "delta-tool");
        assert_eq!(results[0].version, "0.1.0");
        assert_eq!(results[0].source, "bucket-d");
        assert_eq!(results[0].info, "delta.exe");
        assert_eq!(results[1].name, "epsilon-pack");
        assert_eq!(results[1].info, "epsilon.exe  epsilon-helper.exe");
    }

    #[test]
    fn search_table_fallback_supports_single_column_rows() {
        let results = parse_search_results("zeta-item");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "zeta-item");
        assert_eq!(results[0].version, "");
    }

    // ---- 杂项

    #[test]
    fn clean_terminal_output_strips_ansi() {
        assert_eq!(clean_terminal_output("\x1b[32mok\x1b[0m"), "ok");
    }

    #[test]
    fn split_columns_keeps_single_spaces_inside_a_column() {
        assert_eq!(
            split_columns("my cool app  1.2.0  extras"),
            vec!["my cool app", "1.2.0", "extras"]
        );
    }
}

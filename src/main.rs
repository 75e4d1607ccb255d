//! 命令行驱动：把外观层的每个操作暴露成子命令，实时打印输出行。

use anyhow::Result;
use shaozi::scoop::{CommandKind, Facade, OutputLine, PackageRecord, Scoop};
use shaozi::Config;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::load_or_default()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(kind) = parse_args(&args) else {
        print_usage();
        std::process::exit(2);
    };

    let scoop = match &config.shell {
        Some(shell) => Scoop::with_shell(shell.clone()),
        None => Scoop::detect(),
    };
    let facade = Facade::new(scoop, &config);

    let mut pending = facade.submit(kind.clone());

    // Ctrl+C 取消当前命令（排队中不启动，执行中终止子进程）
    let cancel = pending.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("正在取消…");
            cancel.cancel();
        }
    });

    let mut progress_shown = false;
    while let Some(line) = pending.next_line().await {
        match &line {
            OutputLine::Progress(text) => {
                print!("\r{}", text);
                let _ = std::io::stdout().flush();
                progress_shown = true;
            }
            OutputLine::Stdout(_) | OutputLine::Stderr(_) => {
                if progress_shown {
                    println!();
                    progress_shown = false;
                }
                println!("{}", line);
            }
        }
    }
    if progress_shown {
        println!();
    }

    let records = pending.wait().await?;
    match kind {
        CommandKind::List | CommandKind::Search(_) => print_records(&records),
        kind => println!("scoop {} 完成", kind.verb()),
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Option<CommandKind> {
    let name_or_all = |index: usize| -> Option<String> {
        let arg = args.get(index)?;
        Some(if arg == "--all" {
            "*".to_string()
        } else {
            arg.clone()
        })
    };

    match args.first()?.as_str() {
        "list" => Some(CommandKind::List),
        "search" => Some(CommandKind::Search(args.get(1)?.clone())),
        "install" => Some(CommandKind::Install(args.get(1)?.clone())),
        "update" => Some(CommandKind::Update(name_or_all(1)?)),
        "uninstall" => Some(CommandKind::Uninstall(args.get(1)?.clone())),
        "cleanup" => Some(CommandKind::Cleanup(name_or_all(1)?)),
        _ => None,
    }
}

fn print_usage() {
    eprintln!("用法: shaozi <命令> [参数]");
    eprintln!();
    eprintln!("命令:");
    eprintln!("  list               列出已安装的包");
    eprintln!("  search <关键词>    搜索仓库");
    eprintln!("  install <包名>     安装包");
    eprintln!("  update <包名|--all> 更新包（--all 更新全部）");
    eprintln!("  uninstall <包名>   卸载包");
    eprintln!("  cleanup <包名|--all> 清理旧版本");
}

fn print_records(records: &[PackageRecord]) {
    if records.is_empty() {
        println!("（无结果）");
        return;
    }

    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());
    let version_width = records
        .iter()
        .map(|r| r.version.chars().count())
        .max()
        .unwrap_or(0)
        .max("Version".len());

    println!(
        "{:<name_width$}  {:<version_width$}  {}",
        "Name", "Version", "Source"
    );
    for record in records {
        let mut line = format!(
            "{:<name_width$}  {:<version_width$}  {}",
            record.name, record.version, record.source
        );
        if let Some(latest) = &record.update_available {
            line.push_str(&format!("  → {}", latest));
        }
        if !record.info.is_empty() {
            line.push_str(&format!("  [{}]", record.info));
        }
        println!("{}", line.trim_end());
    }
    println!("共 {} 条", records.len());
}

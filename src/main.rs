use std::sync::Arc;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use jql_engine::fitness::Fitness;
use jql_engine::{sample, EngineConfig, IssueIndex, SearchService};

const HELP: &str = r#"输入 JQL 查询并回车执行. 其他命令:
  :user <name>      切换当前用户
  :anonymous        切换为匿名用户
  :fits <jql>       判断查询能否在简单表单中展示
  :sanitize <jql>   输出展示用的查询文本
  :help             显示帮助
  :quit             退出"#;

/// 加载配置, 文件不存在时使用默认配置
fn load_config() -> Result<EngineConfig> {
    let config = EngineConfig::load_or_default("jql.json").context("无法加载 jql.json")?;
    Ok(config)
}

fn build_service(config: EngineConfig) -> SearchService {
    let directory = sample::directory();
    let index = IssueIndex::build(sample::issues(24), &directory);
    SearchService::new(Arc::new(directory), Arc::new(index), config)
}

fn run_query(service: &SearchService, user: Option<&str>, jql: &str) {
    let response = service.search(jql, user);
    if response.is_success() {
        println!("✅ {} 个结果", response.keys.len());
        if !response.keys.is_empty() {
            println!("  {}", response.keys.join(", "));
        }
        for warning in &response.warnings {
            println!("⚠️ {}", warning);
        }
    } else {
        println!("❌ 查询失败 ({})", response.status);
        for error in &response.errors {
            println!("  {}", error);
        }
    }
}

fn run_command(service: &SearchService, user: &mut Option<String>, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        ":quit" | ":exit" => return false,
        ":help" => println!("{}", HELP),
        ":user" if !rest.is_empty() => {
            *user = Some(rest.to_string());
            println!("当前用户: {}", rest);
        }
        ":anonymous" => {
            *user = None;
            println!("当前用户: 匿名");
        }
        ":fits" => match service.parse(rest) {
            Ok(query) => match service.fits_simple_form(&query, user.as_deref()) {
                Fitness::Fits => println!("✅ 可以在简单表单中展示"),
                Fitness::TooComplex(reason) => println!("⚠️ 过于复杂: {}", reason),
            },
            Err(e) => println!("❌ {}", e),
        },
        ":sanitize" => match service.parse(rest) {
            Ok(query) => println!("{}", service.to_jql(&service.sanitize(&query, user.as_deref()))),
            Err(e) => println!("❌ {}", e),
        },
        _ => println!("未知命令 {}, 输入 :help 查看帮助", command),
    }
    true
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("--- JQL 查询引擎 ---");
    let config = load_config()?;
    let service = build_service(config);
    println!("已加载 {} 个演示 issue, 当前用户 admin. 输入 :help 查看帮助", service.index().len());

    let mut editor = DefaultEditor::new().context("无法初始化命令行编辑器")?;
    let mut user = Some("admin".to_string());
    loop {
        let prompt = format!("{}> ", user.as_deref().unwrap_or("anonymous"));
        match editor.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line.starts_with(':') {
                    if !run_command(&service, &mut user, line) {
                        break;
                    }
                } else {
                    run_query(&service, user.as_deref(), line);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("读取输入失败"),
        }
    }
    Ok(())
}

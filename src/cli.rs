use anyhow::{Context, Result};
use std::io::Write;
use tokio_util::sync::CancellationToken;

use reedline::{DefaultCompleter, DefaultHinter, DefaultPrompt, Reedline, Signal};

use crate::client::{
    ChatClient, ChatView, Completion, Role, TranscriptStore, TurnPhase, ViewSink,
};
use crate::config::Config;
use crate::error::ClientError;

/// 打印帮助信息
fn print_help() {
    println!("🤖 oag - open-all-gpt 命令行客户端");
    println!();
    println!("用法：oag <命令>");
    println!();
    println!("命令:");
    println!("  chat            进入交互模式（默认）");
    println!("  models          列出服务器上的模型");
    println!("  transcripts     对话记录管理");
    println!("  onboard         初始化配置");
    println!("  help            显示此帮助信息");
    println!();
    print_chat_help();
    println!("Transcripts 子命令:");
    println!("  transcripts list       - 列出所有对话记录");
    println!("  transcripts show <ID>  - 显示对话记录（支持 ID 前缀）");
    println!();
    println!("环境变量:");
    println!("  OAG_SERVER_URL  服务器地址（默认 http://localhost:8080）");
    println!("  OAG_MODEL       默认模型");
    println!("  RUST_LOG        日志级别");
}

fn print_chat_help() {
    println!("交互模式命令:");
    println!("  /models    - 显示模型目录");
    println!("  /status    - 显示会话状态");
    println!("  /retry     - 继续轮询未完成的查询");
    println!("  /abandon   - 放弃未完成的查询");
    println!("  /reconnect - 重新建立会话");
    println!("  /save      - 保存对话记录");
    println!("  /quit      - 退出");
    println!("  轮询时按 Ctrl-C 可停止等待");
    println!();
}

/// Onboard 命令 - 写入默认配置
fn run_onboard() -> Result<()> {
    println!("🚀 初始化 oag 配置...\n");

    let config = Config::default();
    config
        .ensure_transcripts()
        .context("创建对话记录目录失败")?;
    println!("✅ 创建目录：{}", config.transcript.storage_path.display());

    let config_path = Config::default_path();
    if config_path.exists() {
        println!("ℹ️ 配置文件已存在，未覆盖：{}", config_path.display());
    } else {
        config.save(&config_path).context("保存配置文件失败")?;
        println!("✅ 保存配置：{}", config_path.display());
    }
    println!();
    println!("🎉 初始化完成！");
    println!("  服务器：{}", config.server.endpoint_url());
    println!("  模型：  {}", config.model.default_model);

    Ok(())
}

/// Models 命令 - 只获取目录，不建立会话
async fn run_models() -> Result<()> {
    let config = Config::load_default()?;
    let client = ChatClient::new(config)?;

    let catalog = client.fetch_catalog().await.context("获取模型目录失败")?;
    print_catalog(&catalog);
    Ok(())
}

fn print_catalog(catalog: &crate::types::ModelCatalog) {
    if catalog.is_empty() {
        println!("📭 服务器没有提供模型");
        return;
    }

    println!("📋 模型目录:");
    for line in catalog.render_tree() {
        println!("  {}", line);
    }
    println!();
}

/// Transcripts 命令 - 对话记录管理
fn run_transcripts(args: &[String]) -> Result<()> {
    let config = Config::load_default()?;
    let store = TranscriptStore::new(config.transcript.storage_path.clone());

    let subcommand = args.first().map(|s| s.to_lowercase()).unwrap_or_else(|| "list".to_string());

    match subcommand.as_str() {
        "list" | "l" => transcripts_list(&store),
        "show" | "s" => {
            let Some(id) = args.get(1) else {
                eprintln!("❌ 请指定会话 ID");
                eprintln!("用法：oag transcripts show <ID>");
                std::process::exit(1);
            };
            transcripts_show(&store, id)
        }
        _ => {
            eprintln!("❌ 未知子命令：{}", subcommand);
            eprintln!("运行 'oag help' 查看可用子命令");
            std::process::exit(1);
        }
    }
}

fn transcripts_list(store: &TranscriptStore) -> Result<()> {
    let summaries = store.list()?;

    if summaries.is_empty() {
        println!("📭 暂无对话记录");
        return Ok(());
    }

    println!("📋 对话记录:");
    println!();

    for summary in summaries {
        println!("{} - {}", short_id(&summary.session_id), summary.model_id);
        println!(
            "   更新时间：{} | 轮数：{}",
            summary.updated_at.format("%Y-%m-%d %H:%M"),
            summary.turn_count
        );
        println!();
    }

    Ok(())
}

/// 只显示 ID 前 8 个字符；会话 ID 由服务器分配，不一定是 ASCII
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn transcripts_show(store: &TranscriptStore, id: &str) -> Result<()> {
    let transcript = store.load(id)?;

    println!("📝 会话：{}", transcript.session_id);
    println!("🤖 模型：{}", transcript.model_id);
    println!();
    for turn in &transcript.turns {
        println!("[{}] 🧑 {}", turn.asked_at.format("%H:%M:%S"), turn.prompt);
        println!("[{}] 🤖 {}", turn.answered_at.format("%H:%M:%S"), turn.response);
        println!();
    }
    Ok(())
}

/// 终端渲染：部分结果在同一行原地刷新
struct TerminalView;

impl ChatView for TerminalView {
    fn append_row(&mut self, role: Role, text: &str) {
        match role {
            Role::User => println!("🧑 你：{}", text),
            Role::Model => {
                print!("🤖 AI: {}", text);
                let _ = std::io::stdout().flush();
            }
        }
    }

    fn update_last_output(&mut self, text: &str) {
        print!("\r\x1b[2K🤖 AI: {}", text);
        let _ = std::io::stdout().flush();
    }
}

/// Ctrl-C 时取消轮询
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (cancel, handle)
}

async fn connect(client: &mut ChatClient) {
    println!("🔌 正在连接 {} ...", client.config().server.endpoint_url());

    let result = tokio::select! {
        r = client.connect() => r,
        _ = tokio::signal::ctrl_c() => {
            println!("\n⏹ 已取消连接，输入 /reconnect 重试");
            return;
        }
    };

    match result {
        Ok(()) => {
            let state = client.state();
            println!("🤖 模型：{}", state.model_id().unwrap_or("-"));
            println!("📝 会话：{}", state.session_id().unwrap_or("-"));
            println!();
        }
        Err(e) => {
            println!("❌ 建立会话失败：{}", e);
            println!("输入 /reconnect 重试\n");
        }
    }
}

fn report(client: &ChatClient, result: std::result::Result<Completion, ClientError>) {
    match result {
        Ok(_) => println!("\n"),
        Err(ClientError::EmptyQuery) => {}
        Err(ClientError::SendDisabled) => match client.state().phase() {
            TurnPhase::AwaitingResult { .. } => {
                println!("⏳ 上一个查询尚未完成，输入 /retry 继续或 /abandon 放弃\n")
            }
            _ => println!("❌ 会话未建立，输入 /reconnect 重试\n"),
        },
        Err(e @ ClientError::Cancelled { .. }) | Err(e @ ClientError::PollLimitReached { .. }) => {
            println!("\n⏹ {}", e);
            println!("输入 /retry 继续或 /abandon 放弃\n");
        }
        Err(e) if client.state().outstanding_query().is_some() => {
            println!("\n❌ 轮询失败：{}", e);
            println!("输入 /retry 继续或 /abandon 放弃\n");
        }
        Err(e) => println!("\n❌ 错误：{}\n", e),
    }
}

fn print_status(client: &ChatClient) {
    let state = client.state();
    println!("状态：{}", state.phase().name());
    println!("模型：{}", state.model_id().unwrap_or("-"));
    println!("会话：{}", state.session_id().unwrap_or("-"));
    if let TurnPhase::AwaitingResult {
        query,
        next_attempt,
    } = state.phase()
    {
        println!("在途查询：{}（下一次轮询 #{}）", query.query_id, next_attempt);
    }
    if let Some(transcript) = client.transcript() {
        println!("轮数：{}", transcript.turns.len());
    }
    println!();
}

/// Chat 命令 - 交互式对话
async fn run_chat() -> Result<()> {
    println!("🤖 oag - open-all-gpt 客户端");
    println!("输入 /help 查看帮助，/quit 退出\n");

    let config = Config::load_default()?;
    config.ensure_transcripts()?;

    let mut client = ChatClient::new(config)?;
    connect(&mut client).await;

    let mut sink = ViewSink::new(TerminalView);

    let completer = DefaultCompleter::default();
    let hinter = DefaultHinter::default();
    let prompt = DefaultPrompt::default();

    let mut line_editor = Reedline::create()
        .with_hinter(Box::new(hinter))
        .with_completer(Box::new(completer));

    loop {
        let sig = line_editor.read_line(&prompt)?;

        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();

                if input.is_empty() {
                    continue;
                }

                if input.starts_with('/') {
                    let cmd = input.split_whitespace().next().unwrap_or_default().to_lowercase();

                    match cmd.as_str() {
                        "/quit" | "/exit" => break,
                        "/models" => match client.catalog() {
                            Some(catalog) => print_catalog(catalog),
                            None => match client.fetch_catalog().await {
                                Ok(catalog) => print_catalog(&catalog),
                                Err(e) => println!("❌ 获取模型目录失败：{}\n", e),
                            },
                        },
                        "/status" => print_status(&client),
                        "/retry" => {
                            let (cancel, watcher) = cancel_on_ctrl_c();
                            let result = client.resume(&mut sink, &cancel).await;
                            watcher.abort();
                            report(&client, result);
                        }
                        "/abandon" => match client.abandon() {
                            Ok(query) => println!("✅ 已放弃查询：{}\n", query.query_id),
                            Err(e) => println!("❌ {}\n", e),
                        },
                        "/reconnect" => {
                            if client.state().outstanding_query().is_some() {
                                println!("⏳ 请先完成或放弃当前查询\n");
                            } else {
                                connect(&mut client).await;
                            }
                        }
                        "/save" => match client.save_transcript() {
                            Ok(Some(path)) => println!("✅ 已保存：{}\n", path.display()),
                            Ok(None) => println!("📭 暂无可保存的内容\n"),
                            Err(e) => println!("❌ 保存失败：{}\n", e),
                        },
                        "/help" | "/h" => print_chat_help(),
                        _ => {
                            println!("❌ 未知命令：{}", input);
                            println!("输入 /help 查看帮助\n");
                        }
                    }
                    continue;
                }

                let (cancel, watcher) = cancel_on_ctrl_c();
                let result = client.ask(input, &mut sink, &cancel).await;
                watcher.abort();
                report(&client, result);
            }
            Signal::CtrlD => break,
            Signal::CtrlC => {
                println!("\n输入 /quit 退出，或继续输入问题");
            }
        }
    }

    client.disconnect();
    println!("👋 再见！");
    Ok(())
}

/// 主入口函数
pub async fn run_cli() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let command = args.get(1).map(|s| s.to_lowercase()).unwrap_or_else(|| "chat".to_string());

    match command.as_str() {
        "chat" | "c" => run_chat().await,
        "models" | "m" => run_models().await,
        "transcripts" | "t" => run_transcripts(&args[2..]),
        "onboard" => run_onboard(),
        "help" | "-h" | "--help" | "h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("❌ 未知命令：{}", command);
            eprintln!();
            eprintln!("运行 'oag help' 查看帮助信息");
            std::process::exit(1);
        }
    }
}

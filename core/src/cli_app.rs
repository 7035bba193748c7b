use colored::*;
use std::io::{BufRead, Write};
use std::net::TcpStream;
use std::time::Duration;

const DEFAULT_API_PORT: u16 = 8790;

/// CLI over the command API: capture triggers, transcript, clear.
pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("askpanel-cli")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = &args[1];

    match command.as_str() {
        "ask" | "selection" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} {} <text>", bin, command).yellow());
                return Ok(());
            }
            let text = args[2..].join(" ");
            let resp = call(serde_json::json!({ "command": command, "text": text }))?;
            report_queued(&resp);
        }
        "image" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} image <url>", bin).yellow());
                return Ok(());
            }
            let resp = call(serde_json::json!({ "command": "image", "url": args[2] }))?;
            report_queued(&resp);
        }
        "state" | "thread" => {
            let resp = call(serde_json::json!({ "command": "state" }))?;
            show_state(&resp);
        }
        "clear" => {
            let resp = call(serde_json::json!({ "command": "clear" }))?;
            if succeeded(&resp) {
                println!("{}", "✓ Cleared.".green().bold());
            }
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "askpanel CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <text>        Ask a question", "ask".cyan());
    println!(
        "  {} <text>  Record a selection and ask about it",
        "selection".cyan()
    );
    println!("  {} <url>       Ask about an image", "image".cyan());
    println!("  {}              Print the thread and status", "state".cyan());
    println!("  {}              Clear thread and status", "clear".cyan());
}

fn api_port() -> u16 {
    std::env::var("ASKPANEL_API_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_API_PORT)
}

/// Send one request line and read one response line
fn call(request: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let port = api_port();
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).map_err(|e| {
        anyhow::anyhow!(
            "Could not reach askpanel on port {} ({}). Is the coordinator running?",
            port,
            e
        )
    })?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    writeln!(stream, "{}", request)?;

    let mut response = String::new();
    std::io::BufReader::new(&stream).read_line(&mut response)?;

    Ok(serde_json::from_str(&response)?)
}

fn succeeded(resp: &serde_json::Value) -> bool {
    if resp["success"].as_bool().unwrap_or(false) {
        return true;
    }
    let error = resp["error"].as_str().unwrap_or("Unknown error");
    eprintln!("{} Error: {}", "✗".red().bold(), error.red());
    false
}

fn report_queued(resp: &serde_json::Value) {
    if succeeded(resp) {
        println!(
            "{} Queued. The answer will appear in the thread.",
            "✓".green().bold()
        );
    }
}

fn show_state(resp: &serde_json::Value) {
    if !succeeded(resp) {
        return;
    }
    let data = &resp["data"];

    let empty = Vec::new();
    let thread = data["thread"].as_array().unwrap_or(&empty);
    if thread.is_empty() {
        println!("{}", "Thread is empty".yellow());
    }
    for msg in thread {
        let text = msg["text"].as_str().unwrap_or("");
        let ts = msg["ts"]
            .as_i64()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        match msg["role"].as_str() {
            Some("user") => println!("{} {}", "you".cyan().bold(), ts.dimmed()),
            _ => println!("{} {}", "bot".green().bold(), ts.dimmed()),
        }
        println!("{}", text);
        println!("{}", "─".repeat(60).dimmed());
    }

    let status_text = data["status"]["text"].as_str().unwrap_or("");
    if !status_text.is_empty() {
        let line = match data["status"]["kind"].as_str() {
            Some("ok") => status_text.green(),
            Some("error") => status_text.red(),
            _ => status_text.normal(),
        };
        println!("{} {}", "status:".bright_white().bold(), line);
    }

    let pending = data["pending"].as_u64().unwrap_or(0);
    if data["executing"].as_bool().unwrap_or(false) || pending > 0 {
        println!(
            "{} {} waiting",
            "queue:".bright_white().bold(),
            pending.to_string().cyan()
        );
    }
}

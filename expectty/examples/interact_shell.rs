//! Interact example: spawn a shell, wait for its prompt, then hand over.
//!
//! The shell runs on its own pty. Once the prompt shows up the example
//! types a greeting for you and switches to interact mode: everything you
//! type goes to the shell and everything it prints comes back. Resizing
//! your terminal resizes the shell's.
//!
//! Leave interact mode by exiting the shell, or with Ctrl-C / Ctrl-Z. The
//! shell keeps running after you leave and is closed by the example.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example interact_shell
//! cargo run --example interact_shell -- --shell /bin/bash
//! ```

use std::env;
use std::time::Duration;

use expectty::{Literal, SessionBuilder};
use regex::bytes::Regex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let size = expectty::terminal::window_size().unwrap_or_default();

    let mut session = SessionBuilder::new(&args.shell)
        .env("PS1", "expectty$ ")
        .window_size(size.cols, size.rows)
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    session.start().await?;
    println!("Started {} (pid {:?})", args.shell, session.pid());

    // Some shells ignore PS1 from the environment, so accept any common prompt.
    let prompts = [
        Regex::new(r"expectty\$ $")?,
        Regex::new(r"[$#%>] $")?,
    ];
    let found = session.expect_expressions(&prompts).await?;
    println!("Prompt matched pattern {} after {:?}", found.index(), found.elapsed());

    session.send_line("echo 'hello from expectty'").await?;
    session.expect(Literal::new("hello from expectty")).await?;

    println!("Entering interact mode...");
    session.interact().await?;

    for entry in session.interact_log() {
        eprintln!("interact: {}", entry);
    }

    session.close().await?;
    println!("\nDone!");

    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    shell: String,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let mut timeout = 10u64;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--shell" | "-s" => {
                    i += 1;
                    if i < args.len() {
                        shell = args[i].clone();
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(10);
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self { shell, timeout }
    }

    fn print_help() {
        println!(
            r#"expectty interact_shell example

USAGE:
    cargo run --example interact_shell -- [OPTIONS]

OPTIONS:
    -s, --shell <PATH>       Shell to run [default: $SHELL or /bin/sh]
    -t, --timeout <SECS>     Prompt timeout [default: 10]
    --help                   Print this help message
"#
        );
    }
}

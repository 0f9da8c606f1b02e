//! Scripted example: drive `sh` with send/expect only.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example scripted
//! ```

use std::time::Duration;

use expectty::{Literal, SessionBuilder};
use regex::bytes::Regex;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut session = SessionBuilder::new("/bin/sh")
        .env("PS1", "sh> ")
        .timeout(Duration::from_secs(5))
        .build()?;
    session.start().await?;
    session.expect(Literal::new("sh> ")).await?;

    for command in ["uname -s", "id -un", "false || echo failed"] {
        session.send_line(command).await?;
        let found = session
            .expect_expressions(&[Regex::new(r"failed")?, Regex::new(r"\r\nsh> $")?])
            .await?;
        println!("{:<24} -> pattern {}: {:?}", command, found.index(), found.as_str_lossy());
    }

    // A deadline that nothing will meet.
    match session
        .expect_with_timeout(Literal::new("never printed"), Duration::from_millis(200))
        .await
    {
        Err(e) if e.is_timeout() => println!("timed out as expected: {}", e),
        other => println!("unexpected result: {:?}", other),
    }

    session.close().await?;
    Ok(())
}

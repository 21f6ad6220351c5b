//! `apexclaw chat` — Interactive or single-message chat mode.

use apexclaw_runtime::{DispatchOutcome, InboundMessage};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Chat id used for the terminal conversation.
const CONSOLE_CHAT_ID: i64 = 1;

pub async fn run(
    message: Option<String>,
    sender: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, runtime) = super::build_runtime()?;
    let sender = sender
        .or_else(|| (!config.owner_id.is_empty()).then(|| config.owner_id.clone()))
        .unwrap_or_else(|| "console".to_string());

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = runtime
            .dispatch(InboundMessage::new(&sender, CONSOLE_CHAT_ID, msg))
            .await;
        eprint!("\r              \r");
        report(outcome?);
        return Ok(());
    }

    // Scheduled tasks fire while chatting.
    let shutdown = CancellationToken::new();
    let scheduler = runtime.start_scheduler(shutdown.clone());

    println!();
    println!("  ApexClaw — Interactive Mode");
    println!();
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {}", runtime.tools().names().join(", "));
    println!("  Sender:    {sender}");
    println!("  Tasks:     {}", runtime.scheduler().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  /reset clears the conversation; 'exit' or Ctrl+C quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => {}
            "exit" | "quit" => break,
            "/reset" => {
                runtime.reset_session(&sender);
                println!("  (conversation cleared)");
            }
            _ => {
                eprint!("  ...");
                let outcome = runtime
                    .dispatch(InboundMessage::new(&sender, CONSOLE_CHAT_ID, text))
                    .await;
                eprint!("\r     \r");
                match outcome {
                    Ok(outcome) => report(outcome),
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
        prompt()?;
    }

    shutdown.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// The reply itself was printed by the console transport.
fn report(outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Reply(_) => {}
        DispatchOutcome::BudgetExhausted => tracing::info!("Run stopped at the iteration budget"),
        DispatchOutcome::Timeout(marker) => tracing::warn!(%marker, "Run timed out"),
        DispatchOutcome::Empty => println!("  (no reply)"),
    }
}

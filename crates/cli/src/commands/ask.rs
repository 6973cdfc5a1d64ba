//! `parley ask`: stream one reply from a running gateway.

use futures::StreamExt;
use parley_core::{SseDecoder, StreamEvent};
use std::io::Write;

pub async fn run(
    url: &str,
    user: &str,
    channel: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = format!("{}/api/chat/stream", url.trim_end_matches('/'));
    let body = serde_json::json!({
        "discord_id": user,
        "username": user,
        "channel_id": channel,
        "message": message,
    });

    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&body)
        .send()
        .await?
        .error_for_status()?;

    let mut decoder = SseDecoder::new();
    let mut bytes = response.bytes_stream();
    let mut outcome = Ok(());
    while let Some(chunk) = bytes.next().await {
        for event in decoder.push(&chunk?) {
            outcome = outcome.and(print_event(event?));
        }
    }
    if let Some(event) = decoder.finish() {
        outcome = outcome.and(print_event(event?));
    }
    println!();

    outcome.map_err(Into::into)
}

/// Print one event. Blocked and error events turn into the command's error.
fn print_event(event: StreamEvent) -> Result<(), String> {
    match event {
        StreamEvent::Content(text) => {
            print!("{text}");
            let _ = std::io::stdout().flush();
            Ok(())
        }
        StreamEvent::Stats {
            input_tokens,
            output_tokens,
        } => {
            eprintln!("\n[tokens: {input_tokens} in / {output_tokens} out]");
            Ok(())
        }
        StreamEvent::Blocked(reason) => Err(format!("Blocked: {reason}")),
        StreamEvent::Error(message) => Err(format!("Error: {message}")),
    }
}

//! A minimal handler: connects to the broker, registers a slug, and echoes
//! every forwarded request back with a JSON summary.
//!
//! Run the broker, then:
//!
//! ```text
//! cargo run --example handler -- ws://localhost:3000/ws echo-demo
//! curl http://localhost:3000/echo-demo
//! ```

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:3000/ws".to_string());
    let slug = args.next().unwrap_or_else(|| "echo-demo".to_string());

    let (socket, _) = connect_async(&url).await?;
    let (mut tx, mut rx) = socket.split();

    tx.send(Message::Text(
        json!({ "slug": slug }).to_string().into(),
    ))
    .await?;

    println!("connected to {url}, registering '{slug}'");

    while let Some(msg) = rx.next().await {
        let Message::Text(text) = msg? else { continue };
        let frame: Value = serde_json::from_str(text.as_str())?;

        if frame["type"] == "registered" {
            println!("registered as '{}'", frame["slug"].as_str().unwrap_or(""));
            continue;
        }
        if let Some(error) = frame["error"].as_str() {
            eprintln!("broker error: {error}");
            continue;
        }

        let Some(request_id) = frame["requestId"].as_str() else {
            continue;
        };
        let request = &frame["request"];
        println!(
            "{} {} ({} byte body)",
            request["method"].as_str().unwrap_or("?"),
            request["url"].as_str().unwrap_or("?"),
            request["body"].as_str().map(str::len).unwrap_or(0),
        );

        let reply = json!({
            "slug": slug,
            "requestId": request_id,
            "response": {
                "statusCode": 200,
                "headers": { "Content-Type": "application/json" },
                "body": json!({
                    "echo": {
                        "method": request["method"],
                        "url": request["url"],
                        "body": request["body"],
                    }
                }).to_string(),
            }
        });
        tx.send(Message::Text(reply.to_string().into())).await?;
    }

    Ok(())
}

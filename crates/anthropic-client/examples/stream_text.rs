use anthropic_client::prelude::*;
use futures::StreamExt as _;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let client = Client::from_env()?;
    let request = MessagesRequest::new("claude-sonnet-4-5", 1024)
        .system("Reply to test streaming.")
        .user("Stream a greeting.");

    let mut text = Box::pin(client.stream_messages(&request).await?.into_text());
    while let Some(fragment) = text.next().await {
        match fragment {
            Ok(piece) => print!("{piece}"),
            Err(error) => eprintln!("stream error: {error}"),
        }
    }
    println!();
    Ok(())
}

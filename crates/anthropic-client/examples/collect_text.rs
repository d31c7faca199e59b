use anthropic_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let client = Client::from_env()?;
    let request = MessagesRequest::new("claude-sonnet-4-5", 512)
        .system("You are a concise assistant. Reply with a short sentence.")
        .user("Say hello.");

    let message = client.stream_messages(&request).await?.run().await?;
    println!("{}", message.text());
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use relaychat_proto::chat::v1 as pb;
use relaychat_proto::chat::v1::chat_client::ChatClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::transport::Channel;

#[derive(Parser, Debug)]
#[command(author, version, about = "relaychat terminal client")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:50200")]
    server: String,
    /// Display name; prompted for when omitted.
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let channel = Channel::from_shared(args.server.clone())
        .context("invalid server address")?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    let mut client = ChatClient::new(channel);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let name = match args.name {
        Some(name) => name,
        None => {
            println!("# You need to sign in first. Please enter your name below");
            lines
                .next_line()
                .await?
                .context("stdin closed")?
                .trim()
                .to_string()
        }
    };

    let resp = client
        .register(pb::RegisterRequest { name: name.clone() })
        .await
        .context("registration failed")?;
    let uid = resp.into_inner().session_id;
    println!("# You're signed in, {name}. Proceeding to chat...");
    println!("# Type 'q' to quit");

    let (tx, rx) = mpsc::channel::<pb::ClientMessage>(16);
    let mut request = Request::new(ReceiverStream::new(rx));
    request
        .metadata_mut()
        .insert("uid", uid.parse().context("identity is not valid metadata")?);

    let mut inbound = client
        .communicate(request)
        .await
        .context("failed to open chat stream")?
        .into_inner();

    // Printer runs beside the input loop.
    tokio::spawn(async move {
        loop {
            match inbound.message().await {
                Ok(Some(env)) => {
                    println!("{}: {}", env.sender, env.message);
                }
                Ok(None) => return,
                Err(status) => {
                    eprintln!("# stream error: {status}");
                    return;
                }
            }
        }
    });

    while let Some(line) = lines.next_line().await? {
        let phrase = line.trim();
        match phrase {
            "q" => {
                println!("# good bye");
                break;
            }
            "" => {}
            _ => {
                if tx
                    .send(pb::ClientMessage {
                        message: phrase.to_string(),
                    })
                    .await
                    .is_err()
                {
                    eprintln!("# connection closed");
                    break;
                }
            }
        }
    }

    Ok(())
}

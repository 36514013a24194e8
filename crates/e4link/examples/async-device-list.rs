//! Ask a streaming server for its devices using the tokio line codec.
//!
//! Run with:
//!   cargo run --example async-device-list --features async -- 127.0.0.1:28000

use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::{FramedRead, FramedWrite};

use e4link::frame::LineCodec;
use e4link::session::{parse_response, Command};
use e4link::transport::TcpTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:28000".to_string());

    let stream = TcpTransport::connect_async(&addr).await?;
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, LineCodec::new());
    let mut requests = FramedWrite::new(write_half, LineCodec::new());

    requests.send(Command::List.keyword()).await?;

    while let Some(frame) = frames.next().await {
        let frame = frame?;
        if !frame.is_response() {
            continue;
        }
        let response = parse_response(frame.as_str())?;
        if response.command != Command::List {
            continue;
        }
        if response.devices.is_empty() {
            println!("no devices");
        }
        for device in response.devices {
            println!("{}\t{}", device.id, device.name);
        }
        break;
    }

    Ok(())
}

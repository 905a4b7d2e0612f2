use bytes::Bytes;
use muxstream::{
    transport::{Acceptor, TcpAcceptor, TcpTransport, Transport},
    Builder, ProtResult, Reason,
};

#[tokio::main]
async fn main() -> ProtResult<()> {
    env_logger::init();
    let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await?;
    let addr = acceptor.local_addr()?;
    println!("listening on: {}", addr);

    tokio::spawn(async move {
        loop {
            let io = match acceptor.accept().await {
                Ok(io) => io,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut conn = Builder::new().server_connection(io);
                if conn.connect().await.is_err() {
                    return;
                }
                while let Ok(stream) = conn.accept_stream().await {
                    tokio::spawn(async move {
                        let (reader, writer) = stream.split();
                        let (mut reader, mut writer) = (reader.unwrap(), writer.unwrap());
                        while let Ok(Some(chunk)) = reader.read().await {
                            let len = chunk.len();
                            if writer.write(chunk, false).await.is_err() {
                                return;
                            }
                            reader.advance(len);
                        }
                        let _ = writer.write(Bytes::new(), true).await;
                    });
                }
            });
        }
    });

    let io = TcpTransport.connect(&format!("{}", addr)).await?;
    let mut conn = Builder::new().client_connection(io);
    conn.connect().await?;

    let stream = conn.create_stream(true).await?;
    let (reader, writer) = stream.split();
    let (mut reader, mut writer) = (reader.unwrap(), writer.unwrap());
    writer.write(Bytes::from_static(b"hello muxstream"), true).await?;

    while let Some(chunk) = reader.read().await? {
        println!("echo = {:?}", chunk);
        let len = chunk.len();
        reader.advance(len);
    }

    conn.close(Reason::NO_ERROR).await?;
    Ok(())
}

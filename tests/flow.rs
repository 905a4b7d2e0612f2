// Copyright 2023 - 2024 Muxstream See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// Author: tickbh
// -----
// Created Date: 2024/01/19 14:21:36

#![deny(rust_2018_idioms)]

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::DuplexStream;
    use tokio::time::sleep;

    use muxstream::{transport::MemoryTransport, Builder, MuxConnection, WriteOutcome};

    const WINDOW: u32 = 1024;

    async fn small_window_pair() -> (MuxConnection<DuplexStream>, MuxConnection<DuplexStream>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (io_client, io_server) = MemoryTransport::pair(64 * 1024);
        let mut client = Builder::new().client_connection(io_client);
        let mut server = Builder::new()
            .initial_window_size(WINDOW)
            .server_connection(io_server);
        let (c, s) = tokio::join!(client.connect(), server.connect());
        c.unwrap();
        s.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn exhausted_window_releases_when_peer_reads() {
        let (client, server) = small_window_pair().await;

        let created = client.create_stream(true).await.unwrap();
        let (_, writer) = created.split();
        let mut writer = writer.unwrap();

        let payload = vec![7u8; WINDOW as usize * 4];
        let expected = payload.len();

        // 一次写超过窗口的量, 实现按放行的信用分批写出
        let write_all = async move {
            let outcome = writer.write(Bytes::from(payload), true).await.unwrap();
            assert_eq!(outcome, WriteOutcome::Sent);
        };

        let read_all = async {
            let accepted = server.accept_stream().await.unwrap();
            let (reader, _) = accepted.split();
            let mut reader = reader.unwrap();
            let mut total = 0;
            while let Some(chunk) = reader.read().await.unwrap() {
                total += chunk.len();
                // 消费确认驱动窗口补充, 写端随之解除挂起
                let len = chunk.len();
                reader.advance(len);
            }
            total
        };

        let (_, total) = tokio::join!(write_all, read_all);
        assert_eq!(total, expected);
    }

    #[tokio::test]
    async fn writer_stalls_until_consumer_advances() {
        let (client, server) = small_window_pair().await;

        let created = client.create_stream(true).await.unwrap();
        let (_, writer) = created.split();
        let mut writer = writer.unwrap();

        let write_fut = writer.write(Bytes::from(vec![1u8; WINDOW as usize * 2]), false);
        tokio::pin!(write_fut);

        // 窗口耗尽, 写入挂起
        tokio::select! {
            _ = &mut write_fut => panic!("write must stall on an exhausted window"),
            _ = sleep(Duration::from_millis(100)) => {}
        }

        let accepted = server.accept_stream().await.unwrap();
        let (reader, _) = accepted.split();
        let mut reader = reader.unwrap();

        // 只读不确认: 数据交付了, 但对端窗口不补充
        let mut drained = 0;
        while drained < WINDOW as usize {
            let chunk = reader.read().await.unwrap().unwrap();
            drained += chunk.len();
        }
        assert_eq!(drained, WINDOW as usize);

        tokio::select! {
            _ = &mut write_fut => panic!("window must stay empty before advance"),
            _ = sleep(Duration::from_millis(100)) => {}
        }

        // 显式确认消费后窗口补充, 写入完成
        reader.advance(drained);
        write_fut.await.unwrap();

        let mut rest = 0;
        while rest < WINDOW as usize {
            let chunk = reader.read().await.unwrap().unwrap();
            rest += chunk.len();
        }
        assert_eq!(rest, WINDOW as usize);
    }

    #[tokio::test]
    async fn window_is_per_stream() {
        let (client, server) = small_window_pair().await;

        let starved = client.create_stream(true).await.unwrap();
        let (_, sw) = starved.split();
        let mut sw = sw.unwrap();
        let starved_id = sw.id();
        // 第一条流吃满自己的窗口
        sw.write(Bytes::from(vec![0u8; WINDOW as usize]), false)
            .await
            .unwrap();
        let stalled = sw.write(Bytes::from_static(b"x"), false);
        tokio::pin!(stalled);
        tokio::select! {
            _ = &mut stalled => panic!("first stream must be stalled"),
            _ = sleep(Duration::from_millis(50)) => {}
        }

        // 第二条流的信用独立, 不受第一条流反压影响
        let fresh = client.create_stream(true).await.unwrap();
        let (_, fw) = fresh.split();
        let mut fw = fw.unwrap();
        fw.write(Bytes::from_static(b"independent"), true)
            .await
            .unwrap();

        let first = server.accept_stream().await.unwrap();
        let second = server.accept_stream().await.unwrap();
        assert_eq!(first.id(), starved_id);

        let (reader, _) = second.split();
        let mut reader = reader.unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = reader.read().await.unwrap() {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(&data, b"independent");
        drop(first);
    }
}

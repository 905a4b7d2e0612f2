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
    use tokio::time::{sleep, timeout};

    use muxstream::{
        transport::MemoryTransport, Builder, MuxConnection, ProtError, StreamIdentifier,
        WriteOutcome,
    };

    async fn pair(
        client: Builder,
        server: Builder,
    ) -> (MuxConnection<DuplexStream>, MuxConnection<DuplexStream>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (io_client, io_server) = MemoryTransport::pair(64 * 1024);
        let mut client = client.client_connection(io_client);
        let mut server = server.server_connection(io_server);
        let (c, s) = tokio::join!(client.connect(), server.connect());
        c.unwrap();
        s.unwrap();
        (client, server)
    }

    async fn default_pair() -> (MuxConnection<DuplexStream>, MuxConnection<DuplexStream>) {
        pair(Builder::new(), Builder::new()).await
    }

    #[tokio::test]
    async fn bidirectional_round_trip() {
        let (client, server) = default_pair().await;

        let created = client.create_stream(true).await.unwrap();
        assert!(created.is_bidirectional());
        assert!(!created.is_remote());
        let (reader, writer) = created.split();
        let mut reader = reader.unwrap();
        let mut writer = writer.unwrap();
        writer
            .write(Bytes::from_static(b"ping"), true)
            .await
            .unwrap();

        let accepted = server.accept_stream().await.unwrap();
        // 发起方与接受方观察到同一个流号
        assert_eq!(accepted.id(), writer.id());
        assert!(accepted.is_bidirectional());
        assert!(accepted.is_remote());

        let (peer_reader, peer_writer) = accepted.split();
        let mut peer_reader = peer_reader.unwrap();
        let mut peer_writer = peer_writer.unwrap();

        let mut request = Vec::new();
        while let Some(chunk) = peer_reader.read().await.unwrap() {
            request.extend_from_slice(&chunk);
            let len = chunk.len();
            peer_reader.advance(len);
        }
        assert_eq!(&request, b"ping");

        peer_writer
            .write(Bytes::from_static(b"pong"), true)
            .await
            .unwrap();

        let mut response = Vec::new();
        while let Some(chunk) = reader.read().await.unwrap() {
            response.extend_from_slice(&chunk);
            let len = chunk.len();
            reader.advance(len);
        }
        assert_eq!(&response, b"pong");
    }

    #[tokio::test]
    async fn unidirectional_stream_has_single_half() {
        let (client, server) = default_pair().await;

        let mut created = client.create_stream(false).await.unwrap();
        assert!(!created.is_bidirectional());
        assert!(created.recv_stream().is_none());
        // 第一条单向流的流号带方向位
        assert_eq!(created.id(), StreamIdentifier(2));
        created
            .send_stream()
            .unwrap()
            .write(Bytes::from_static(b"one way"), true)
            .await
            .unwrap();

        let mut accepted = server.accept_stream().await.unwrap();
        assert_eq!(accepted.id(), StreamIdentifier(2));
        assert!(accepted.send_stream().is_none());
        let reader = accepted.recv_stream().unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = reader.read().await.unwrap() {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(&data, b"one way");
    }

    #[tokio::test]
    async fn stream_ids_monotonic_per_class() {
        let (client, server) = default_pair().await;

        let first = client.create_stream(true).await.unwrap();
        let second = client.create_stream(true).await.unwrap();
        let uni = client.create_stream(false).await.unwrap();
        assert_eq!(first.id(), StreamIdentifier(0));
        assert_eq!(second.id(), StreamIdentifier(4));
        assert_eq!(uni.id(), StreamIdentifier(2));

        // 服务端发起的流在另一半流号空间
        let from_server = server.create_stream(true).await.unwrap();
        assert_eq!(from_server.id(), StreamIdentifier(1));
        let accepted = client.accept_stream().await.unwrap();
        assert_eq!(accepted.id(), StreamIdentifier(1));
        assert!(accepted.is_remote());
    }

    #[tokio::test]
    async fn cancel_accept_keeps_connection_usable() {
        let (client, server) = default_pair().await;

        // 没有流排队, accept挂起, 超时丢弃该future即取消
        let waited = timeout(Duration::from_millis(50), server.accept_stream()).await;
        assert!(waited.is_err());

        // 取消只影响那一次调用, 连接照常可用
        let created = client.create_stream(true).await.unwrap();
        let (_, writer) = created.split();
        let mut writer = writer.unwrap();
        writer.write(Bytes::from_static(b"x"), true).await.unwrap();

        let accepted = server.accept_stream().await.unwrap();
        assert_eq!(accepted.id(), writer.id());
    }

    #[tokio::test]
    async fn admission_blocks_and_releases_fifo() {
        // 服务端只允许两条对向双向流
        let (client, server) = pair(
            Builder::new(),
            Builder::new().max_bidirectional_streams(2),
        )
        .await;

        let mut first = client.create_stream(true).await.unwrap();
        let _second = client.create_stream(true).await.unwrap();

        // 名额用满, 第三条挂起; 超时取消不占用流号
        let waited = timeout(Duration::from_millis(50), client.create_stream(true)).await;
        assert!(waited.is_err());

        let third = client.create_stream(true);
        tokio::pin!(third);
        tokio::select! {
            _ = &mut third => panic!("create must stay blocked while at ceiling"),
            _ = sleep(Duration::from_millis(50)) => {}
        }

        // 显式完成一条流(两个半边都终止, 对端同步观察到)正好放行一个等待者
        first.dispose();
        drop(first);
        let third = third.await.unwrap();
        // 被取消的那次没有消耗流号
        assert_eq!(third.id(), StreamIdentifier(8));

        // 单向流配额独立, 不受双向流满额影响
        let uni = client.create_stream(false).await.unwrap();
        assert_eq!(uni.id(), StreamIdentifier(2));

        drop(server);
    }

    #[tokio::test]
    async fn streams_do_not_block_each_other() {
        let (client, server) = default_pair().await;

        let s1 = client.create_stream(true).await.unwrap();
        let s2 = client.create_stream(true).await.unwrap();
        let (_, w1) = s1.split();
        let (_, w2) = s2.split();
        let mut w1 = w1.unwrap();
        let mut w2 = w2.unwrap();

        // 第二条流先写完, 不被第一条流影响
        w2.write(Bytes::from_static(b"second"), true).await.unwrap();

        let a1 = server.accept_stream().await.unwrap();
        let a2 = server.accept_stream().await.unwrap();
        assert_eq!(a1.id(), w1.id());
        assert_eq!(a2.id(), w2.id());

        let (r2, _) = a2.split();
        let mut r2 = r2.unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = r2.read().await.unwrap() {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(&data, b"second");

        w1.write(Bytes::from_static(b"first"), true).await.unwrap();
        let (r1, _) = a1.split();
        let mut r1 = r1.unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = r1.read().await.unwrap() {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(&data, b"first");
    }

    #[tokio::test]
    async fn early_input_complete_stops_peer_writer() {
        let (client, server) = default_pair().await;

        let created = client.create_stream(true).await.unwrap();
        let (_, writer) = created.split();
        let mut writer = writer.unwrap();
        writer.write(Bytes::from_static(b"head"), false).await.unwrap();

        let accepted = server.accept_stream().await.unwrap();
        let (reader, _) = accepted.split();
        let mut reader = reader.unwrap();
        let _ = reader.read().await.unwrap();
        // 不再需要这条流, 提前终止输入半边
        reader.complete();

        // 对端的写入方收敛到Stopped而不是挂死
        let outcome = loop {
            match writer.write(Bytes::from_static(b"more"), false).await {
                Ok(WriteOutcome::Sent) => sleep(Duration::from_millis(10)).await,
                Ok(WriteOutcome::Stopped) => break WriteOutcome::Stopped,
                Err(e) => panic!("expect clean stop, got {}", e),
            }
        };
        assert_eq!(outcome, WriteOutcome::Stopped);
    }

    #[tokio::test]
    async fn stream_reset_does_not_touch_other_streams() {
        let (client, server) = default_pair().await;

        let doomed = client.create_stream(true).await.unwrap();
        let healthy = client.create_stream(true).await.unwrap();
        let (_, dw) = doomed.split();
        let mut dw = dw.unwrap();
        dw.write(Bytes::from_static(b"a"), false).await.unwrap();
        let (_, hw) = healthy.split();
        let mut hw = hw.unwrap();
        hw.write(Bytes::from_static(b"b"), false).await.unwrap();

        let a_doomed = server.accept_stream().await.unwrap();
        let mut a_healthy = server.accept_stream().await.unwrap();

        // 以错误码重置第一条流
        dw.complete(Some(muxstream::Reason::application(3))).unwrap();
        let (dr, _) = a_doomed.split();
        let mut dr = dr.unwrap();
        let err = loop {
            match dr.read().await {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("reset stream must not end cleanly"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ProtError::StreamAborted(_)));

        // 另一条流不受影响
        hw.write(Bytes::from_static(b"c"), true).await.unwrap();
        let hr = a_healthy.recv_stream().unwrap();
        let mut data = Vec::new();
        while let Some(chunk) = hr.read().await.unwrap() {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(&data, b"bc");
    }

    #[tokio::test(start_paused = true)]
    async fn infinite_idle_timeout_never_aborts() {
        let (client, server) = default_pair().await;

        // 双方都是无限空闲, 长时间安静后接收仍然挂起而不是失败
        let waited = timeout(Duration::from_secs(3600), server.accept_stream()).await;
        assert!(waited.is_err());

        // 连接依旧可用
        let created = client.create_stream(true).await.unwrap();
        let (_, w) = created.split();
        w.unwrap()
            .write(Bytes::from_static(b"still alive"), true)
            .await
            .unwrap();
        let accepted = server.accept_stream().await.unwrap();
        assert!(accepted.is_remote());
    }

    #[tokio::test(start_paused = true)]
    async fn finite_idle_timeout_kept_alive_by_keepalive() {
        let (client, server) = pair(
            Builder::new().idle_timeout(Some(Duration::from_secs(1))),
            Builder::new(),
        )
        .await;

        // 保活在双方之间往返, 有限超时不会因安静而触发
        sleep(Duration::from_secs(10)).await;

        let created = client.create_stream(true).await.unwrap();
        let (_, w) = created.split();
        w.unwrap()
            .write(Bytes::from_static(b"alive"), true)
            .await
            .unwrap();
        let accepted = server.accept_stream().await.unwrap();
        assert_eq!(accepted.id(), StreamIdentifier(0));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_without_keepalive_aborts() {
        // 双方都把保活推到天荒地老, 看门狗必须触发
        let huge = Duration::from_secs(1 << 20);
        let (client, _server) = pair(
            Builder::new()
                .idle_timeout(Some(Duration::from_secs(1)))
                .keepalive_interval(huge),
            Builder::new().keepalive_interval(huge),
        )
        .await;

        sleep(Duration::from_secs(3)).await;

        let err = client.accept_stream().await.unwrap_err();
        match err {
            ProtError::ConnectionAborted(reason) => {
                assert_eq!(reason, muxstream::Reason::IDLE_TIMEOUT)
            }
            e => panic!("expect idle abort, got {}", e),
        }
    }
}

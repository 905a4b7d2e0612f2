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

    use muxstream::{
        transport::MemoryTransport, Builder, MuxConnection, ProtError, Reason,
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
    async fn close_no_error_observed_as_closed_by_peer() {
        let (client, server) = default_pair().await;

        let (closed, observed) = tokio::join!(client.close(Reason::NO_ERROR), async {
            server.accept_stream().await.unwrap_err()
        });
        closed.unwrap();
        assert!(matches!(observed, ProtError::ConnectionClosedByPeer));

        // 对端后续的创建也拿到同一个终止错误
        let err = server.create_stream(true).await.unwrap_err();
        assert!(matches!(err, ProtError::ConnectionClosedByPeer));
    }

    #[tokio::test]
    async fn close_server_busy_observed_as_server_busy() {
        let (client, server) = default_pair().await;

        // close完成表示对端已确认, 此刻对端必然已记录ServerBusy
        server.close(Reason::SERVER_BUSY).await.unwrap();
        let err = client.create_stream(true).await.unwrap_err();
        assert!(matches!(err, ProtError::ServerBusy));
        let err = client.accept_stream().await.unwrap_err();
        assert!(matches!(err, ProtError::ServerBusy));
    }

    #[tokio::test]
    async fn close_application_code_passes_through() {
        let (client, server) = default_pair().await;

        let code = Reason::application(42);
        let (closed, observed) = tokio::join!(client.close(code), async {
            server.accept_stream().await.unwrap_err()
        });
        closed.unwrap();
        match observed {
            ProtError::ConnectionAborted(reason) => assert_eq!(reason, code),
            e => panic!("expect application close code, got {}", e),
        }
    }

    #[tokio::test]
    async fn close_unrecognized_code_maps_to_aborted() {
        let (client, server) = default_pair().await;

        let (closed, observed) = tokio::join!(client.close(Reason::from(0xdead)), async {
            server.accept_stream().await.unwrap_err()
        });
        closed.unwrap();
        assert!(matches!(observed, ProtError::ConnectionAborted(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_commutative() {
        let (client, server) = default_pair().await;

        // 双方同时关闭, 各自都正常完成
        let (c, s) = tokio::join!(client.close(Reason::NO_ERROR), server.close(Reason::NO_ERROR));
        c.unwrap();
        s.unwrap();

        // 重复关闭是无害的空操作
        client.close(Reason::NO_ERROR).await.unwrap();
        server.close(Reason::NO_ERROR).await.unwrap();
    }

    #[tokio::test]
    async fn calls_after_close_fail_immediately_with_recorded_error() {
        let (client, server) = default_pair().await;
        client.close(Reason::NO_ERROR).await.unwrap();

        let err = client.create_stream(true).await.unwrap_err();
        assert!(matches!(err, ProtError::ConnectionAborted(_)));
        let err = client.accept_stream().await.unwrap_err();
        assert!(matches!(err, ProtError::ConnectionAborted(_)));

        // 多晚调用都得到同一个确定的结果
        sleep(Duration::from_millis(50)).await;
        let err = client.create_stream(false).await.unwrap_err();
        assert!(matches!(err, ProtError::ConnectionAborted(_)));
        drop(server);
    }

    #[tokio::test]
    async fn dispose_fails_peer_blocked_writer() {
        // 小窗口让写入方尽快陷入反压
        let (client, server) = pair(
            Builder::new(),
            Builder::new().initial_window_size(1024),
        )
        .await;

        let created = client.create_stream(true).await.unwrap();
        let (_, writer) = created.split();
        let mut writer = writer.unwrap();

        // 对端不消费, 持续写1字节直到挂起
        let blocked = tokio::spawn(async move {
            loop {
                if let Err(e) = writer.write(Bytes::from_static(b"a"), false).await {
                    return e;
                }
            }
        });

        sleep(Duration::from_millis(100)).await;
        server.dispose();

        // 挂起的写入必须以连接级错误收敛, 不能无限等待
        let err = tokio::time::timeout(Duration::from_secs(5), blocked)
            .await
            .expect("blocked write must resolve after dispose")
            .unwrap();
        assert!(matches!(
            err,
            ProtError::ConnectionAborted(_) | ProtError::ConnectionClosedByPeer
        ));

        // 断开方自身的后续调用同样立即失败
        let err = server.create_stream(true).await.unwrap_err();
        assert!(matches!(err, ProtError::ConnectionAborted(_)));
    }

    #[tokio::test]
    async fn dispose_fails_own_pending_ops() {
        let (client, server) = default_pair().await;

        let pending = tokio::spawn(async move {
            let err = server.accept_stream().await.unwrap_err();
            // dispose后server被move进闭包, 一并验证重复dispose无害
            server.dispose();
            server.dispose();
            err
        });

        sleep(Duration::from_millis(50)).await;
        client.dispose();
        client.dispose();

        let err = pending.await.unwrap();
        assert!(matches!(
            err,
            ProtError::ConnectionAborted(_) | ProtError::ConnectionClosedByPeer
        ));
    }
}

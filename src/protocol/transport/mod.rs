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
// Created Date: 2024/01/17 09:42:25

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::{ProtError, ProtResult};

/// 连接方的传输能力: 只要求产出一条有序可靠的双工字节通道.
/// 复用核心不感知具体传输, TCP/TLS/进程内通道都从这里进来
#[async_trait]
pub trait Transport {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, addr: &str) -> ProtResult<Self::Io>;
}

/// 监听方的传输能力
#[async_trait]
pub trait Acceptor {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> ProtResult<Self::Io>;
}

pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Io = TcpStream;

    async fn connect(&self, addr: &str) -> ProtResult<TcpStream> {
        Ok(TcpStream::connect(addr).await?)
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(addr: &str) -> ProtResult<TcpAcceptor> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AddrInUse {
                ProtError::AddressInUse
            } else {
                ProtError::IoError(e)
            }
        })?;
        Ok(TcpAcceptor { listener })
    }

    pub fn local_addr(&self) -> ProtResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Io = TcpStream;

    async fn accept(&mut self) -> ProtResult<TcpStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }
}

/// 进程内传输, 测试与同进程RPC使用
pub struct MemoryTransport;

impl MemoryTransport {
    /// 一对互联的双工通道
    pub fn pair(capacity: usize) -> (DuplexStream, DuplexStream) {
        tokio::io::duplex(capacity)
    }

    /// 可多次connect/accept的进程内监听对
    pub fn channel(capacity: usize) -> (MemoryConnector, MemoryAcceptor) {
        let (tx, rx) = channel(8);
        (
            MemoryConnector { tx, capacity },
            MemoryAcceptor { rx },
        )
    }
}

pub struct MemoryConnector {
    tx: Sender<DuplexStream>,
    capacity: usize,
}

#[async_trait]
impl Transport for MemoryConnector {
    type Io = DuplexStream;

    async fn connect(&self, _addr: &str) -> ProtResult<DuplexStream> {
        let (near, far) = tokio::io::duplex(self.capacity);
        self.tx
            .send(far)
            .await
            .map_err(|_| ProtError::Extension("acceptor is gone"))?;
        Ok(near)
    }
}

pub struct MemoryAcceptor {
    rx: Receiver<DuplexStream>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    type Io = DuplexStream;

    async fn accept(&mut self) -> ProtResult<DuplexStream> {
        self.rx
            .recv()
            .await
            .ok_or(ProtError::Extension("all connectors are gone"))
    }
}

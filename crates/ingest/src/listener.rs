//! TCP 이벤트 리스너
//!
//! 길이 접두사 프레임으로 인코딩된 이벤트 문자열을 TCP 소켓으로
//! 수신합니다. 각 연결은 별도의 tokio 태스크에서 처리되며 자체
//! [`FrameReader`]를 가집니다. 디코딩된 이벤트 문자열은 mpsc 채널로
//! 전달됩니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use metrics::{counter, gauge};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use millrace_core::metrics::{
    INGEST_BYTES_TOTAL, INGEST_CONNECTIONS_ACTIVE, INGEST_FRAMES_TOTAL, INGEST_FRAME_ERRORS_TOTAL,
};

use crate::error::IngestError;
use crate::frame::{FrameReader, MAX_FRAME_SIZE};

/// 연결당 수신 버퍼 크기
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// TCP 이벤트 리스너 설정
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// 바인드 주소 (예: "0.0.0.0:1514")
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 프레임 페이로드 크기 (바이트)
    pub max_frame_size: usize,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:1514".to_owned(),
            max_connections: 256,
            max_frame_size: MAX_FRAME_SIZE,
            connection_timeout_secs: 300,
        }
    }
}

/// TCP 이벤트 리스너
///
/// 연결 수락 루프를 실행하고 연결마다 프레임 디코딩 태스크를 스폰
/// 합니다. CancellationToken으로 graceful shutdown을 지원합니다.
pub struct EventListener {
    config: ListenerConfig,
    /// 디코딩된 이벤트 문자열 전송 채널
    tx: mpsc::Sender<String>,
    cancel_token: CancellationToken,
    listener: Option<TcpListener>,
}

impl EventListener {
    /// 새 리스너를 생성합니다.
    pub fn new(
        config: ListenerConfig,
        tx: mpsc::Sender<String>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            tx,
            cancel_token,
            listener: None,
        }
    }

    /// TCP 소켓에 바인드하고 실제 바인드된 주소를 반환합니다.
    ///
    /// 포트 0으로 바인드하면 임의 포트가 할당됩니다. [`run`](EventListener::run)
    /// 전에 호출하지 않으면 `run`이 직접 바인드합니다.
    pub async fn bind(&mut self) -> Result<SocketAddr, IngestError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| IngestError::Listener {
                reason: format!("failed to bind to {}: {e}", self.config.bind_addr),
            })?;
        let addr = listener.local_addr().map_err(|e| IngestError::Listener {
            reason: format!("failed to read local addr: {e}"),
        })?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// 연결 수락 루프를 실행합니다.
    ///
    /// 각 연결은 별도 태스크에서 처리됩니다. CancellationToken이
    /// 취소되면 루프를 종료합니다.
    pub async fn run(&mut self) -> Result<(), IngestError> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self.listener.take().ok_or_else(|| IngestError::Listener {
            reason: "listener already consumed".to_owned(),
        })?;

        info!(bind_addr = %self.config.bind_addr, "event listener started");

        let connection_semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, addr) = result.map_err(|e| IngestError::Listener {
                        reason: format!("accept error: {e}"),
                    })?;

                    let permit = match connection_semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            warn!(peer = %addr, "max connections reached, rejecting connection");
                            continue;
                        }
                    };

                    debug!(peer = %addr, "accepted connection");
                    gauge!(INGEST_CONNECTIONS_ACTIVE).increment(1.0);

                    let tx = self.tx.clone();
                    let config = self.config.clone();
                    let cancel = self.cancel_token.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, tx, config, addr, cancel).await {
                            error!(peer = %addr, error = %e, "connection handler error");
                        }
                        gauge!(INGEST_CONNECTIONS_ACTIVE).decrement(1.0);
                        drop(permit);
                    });
                }
                _ = self.cancel_token.cancelled() => {
                    info!("event listener received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// 단일 TCP 연결을 처리합니다.
///
/// 프레이밍 에러는 경고 로그를 남기고 연결을 유지합니다. EOF, 읽기
/// 에러, 타임아웃, 취소 시 연결을 종료합니다.
async fn handle_connection(
    mut stream: TcpStream,
    tx: mpsc::Sender<String>,
    config: ListenerConfig,
    peer: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    let mut reader = FrameReader::with_max_frame_size(config.max_frame_size);
    let mut buf = BytesMut::with_capacity(RECV_BUFFER_SIZE);
    let connection_timeout = Duration::from_secs(config.connection_timeout_secs);

    loop {
        buf.clear();

        tokio::select! {
            result = timeout(connection_timeout, stream.read_buf(&mut buf)) => {
                match result {
                    Ok(Ok(0)) => {
                        debug!(peer = %peer, "connection closed by peer");
                        break;
                    }
                    Ok(Ok(read)) => {
                        counter!(INGEST_BYTES_TOTAL).increment(read as u64);

                        match reader.feed(&buf) {
                            Ok(events) => {
                                for event in events {
                                    counter!(INGEST_FRAMES_TOTAL).increment(1);
                                    if tx.send(event).await.is_err() {
                                        debug!(peer = %peer, "event channel closed, dropping connection");
                                        return Ok(());
                                    }
                                }
                            }
                            Err(e) => {
                                // 리더는 리셋됐고 스트림은 계속 소비한다
                                counter!(INGEST_FRAME_ERRORS_TOTAL).increment(1);
                                warn!(peer = %peer, error = %e, "framing error, chunk dropped");
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        return Err(IngestError::Listener {
                            reason: format!("read error from {peer}: {e}"),
                        });
                    }
                    Err(_) => {
                        warn!(peer = %peer, "connection timeout");
                        return Err(IngestError::Listener {
                            reason: format!("connection timeout from {peer}"),
                        });
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!(peer = %peer, "connection handler received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

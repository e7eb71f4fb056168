use rask_log_shipper::buffer::Batch;
use rask_log_shipper::sender::WriteError;
use rask_log_shipper::{Backend, BackendKind, DispatchPool, LogRecord, Writer, WriterConfig};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Accepts any number of connections and forwards `(connection, line)`.
async fn spawn_line_server() -> (u16, mpsc::UnboundedReceiver<(usize, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connection = 0;
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let id = connection;
            connection += 1;
            tokio::spawn(async move {
                let mut lines = BufReader::new(socket).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send((id, line)).is_err() {
                        break;
                    }
                }
            });
        }
    });

    (port, rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_tcp_delivery() {
    let (port, mut received) = spawn_line_server().await;
    let backend = Backend::new(BackendKind::Tcp, "127.0.0.1", port);
    let writer = Writer::new(
        vec![backend],
        WriterConfig {
            concurrency: 2,
            buffer_size: 1000,
            rate_limit: -1,
        },
    )
    .unwrap();

    for i in 0..40 {
        writer
            .write(LogRecord::new(format!("record-{i:02}"), format!("payload {i}")))
            .unwrap();
    }

    let mut per_connection: HashMap<usize, Vec<usize>> = HashMap::new();
    for _ in 0..40 {
        let (connection, line) = tokio::time::timeout(Duration::from_secs(10), received.recv())
            .await
            .expect("timed out waiting for lines")
            .expect("server stopped");
        let record: LogRecord = serde_json::from_str(&line).expect("line is not a record");
        let index: usize = record.name.trim_start_matches("record-").parse().unwrap();
        assert_eq!(record.data, format!("payload {index}"));
        per_connection.entry(connection).or_default().push(index);
    }

    // Within one connection, records arrive in the order they were written
    for indices in per_connection.values() {
        assert!(indices.windows(2).all(|w| w[0] < w[1]), "{indices:?}");
    }
    let total: usize = per_connection.values().map(Vec::len).sum();
    assert_eq!(total, 40);

    writer.close().await;
    assert_eq!(writer.sent(), 40);
    assert_eq!(writer.failed(), 0);
    assert_eq!(writer.dropped(), 0);
}

#[tokio::test]
async fn test_end_to_end_udp_delivery() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let backend = Backend::new(BackendKind::Udp, "127.0.0.1", port);
    let writer = Writer::new(vec![backend], WriterConfig::default()).unwrap();

    for i in 0..10 {
        writer.write(LogRecord::new("udp", format!("datagram {i}"))).unwrap();
    }

    let mut lines = Vec::new();
    let mut buf = vec![0u8; 2048];
    while lines.len() < 10 {
        let len = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
            .await
            .expect("timed out waiting for datagrams")
            .unwrap();
        assert!(len <= 1420);
        let text = std::str::from_utf8(&buf[..len]).unwrap();
        lines.extend(text.lines().map(str::to_string));
    }

    for (i, line) in lines.iter().enumerate() {
        let record: LogRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.data, format!("datagram {i}"));
    }
    writer.close().await;
}

#[tokio::test]
async fn test_black_hole_counts_every_record_as_sent() {
    let writer = Writer::new(vec![Backend::black_hole()], WriterConfig::default()).unwrap();

    for i in 0..1000 {
        writer.write(LogRecord::new("bulk", format!("{i}"))).unwrap();
    }

    assert!(eventually(|| writer.sent() == 1000).await);
    assert_eq!(writer.dropped(), 0);
    assert_eq!(writer.failed(), 0);
    writer.close().await;
}

#[tokio::test]
async fn test_excess_writes_are_dropped_as_buffer_full() {
    let writer = Writer::new(
        Vec::new(),
        WriterConfig {
            concurrency: 1,
            buffer_size: 100,
            rate_limit: -1,
        },
    )
    .unwrap();

    // No await between writes, so the batching loop cannot drain the queue
    let rejected = (0..130)
        .map(|i| writer.write(LogRecord::new("burst", format!("{i}"))))
        .filter(|r| *r == Err(WriteError::BufferFull))
        .count();

    assert_eq!(rejected, 30);
    assert_eq!(writer.dropped(), 30);
    writer.close().await;
    assert_eq!(writer.sent(), 100);
}

#[tokio::test]
async fn test_write_after_close_never_enqueues() {
    let writer = Writer::new(Vec::new(), WriterConfig::default()).unwrap();
    writer.close().await;

    for _ in 0..5 {
        assert_eq!(
            writer.write(LogRecord::new("late", "x")),
            Err(WriteError::Closed)
        );
    }
    assert_eq!(writer.dropped(), 5);
    assert_eq!(writer.sent(), 0);
    assert_eq!(writer.queued(), 0);
}

#[tokio::test]
async fn test_unreachable_backend_reports_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = DispatchPool::new(vec![Backend::new(BackendKind::Tcp, "127.0.0.1", port)], 2).unwrap();
    let batch = Batch::detached(vec![LogRecord::new("x", "1"), LogRecord::new("x", "2")]);
    assert!(pool.send(batch).await);
    pool.close().await;

    assert_eq!(pool.sent(), 2);
    assert_eq!(pool.failed(), 2);
}

//! Integration tests for the WebSocket transport, over a real socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;
    use vigil_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: SocketAddr) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    /// Binds on an OS-assigned port and returns one accepted connection
    /// plus the client side of it.
    async fn pair() -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address");

        let server = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = connect_client(addr).await;
        let conn = server.await.expect("accept task should complete");
        (conn, client)
    }

    #[tokio::test]
    async fn test_websocket_text_round_trip() {
        let (conn, mut client) = pair().await;
        assert!(conn.id().into_inner() > 0);
        assert!(conn.peer_addr().is_some());

        conn.send_text(r#"{"op":"welcome"}"#).await.unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"op":"welcome"}"#);

        client.send(Message::Text("hello".into())).await.unwrap();
        let received = conn.recv().await.unwrap().expect("should have data");
        assert_eq!(received, b"hello");

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_binary_send() {
        let (conn, mut client) = pair().await;

        conn.send(b"\x00\x01").await.unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_binary());
        assert_eq!(msg.into_data().as_ref(), b"\x00\x01");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (conn, mut client) = pair().await;

        client.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending() {
        let (conn, mut client) = pair().await;
        let conn = Arc::new(conn);

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::task::yield_now().await;

        // The reader holds the read half; writing must not wait on it.
        conn.send_text("ping").await.unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "ping");

        client.send(Message::Text("pong".into())).await.unwrap();
        let received = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(received, b"pong");
    }
}

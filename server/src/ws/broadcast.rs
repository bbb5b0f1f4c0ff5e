use axum::extract::ws::Message;

use super::ConnectionRegistry;

/// Send a text frame to every registered connection, the sender included.
///
/// Each recipient is queued independently; a closed peer is logged and
/// skipped. Returns how many connections accepted the frame.
pub fn broadcast_to_all(registry: &ConnectionRegistry, text: &str) -> usize {
    let msg = Message::Text(text.into());
    let recipients = registry.snapshot();
    let mut delivered = 0;

    for connection in &recipients {
        match connection.send(msg.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    error = %e,
                    "Dropped broadcast to closed connection"
                );
            }
        }
    }

    tracing::debug!(
        recipients = recipients.len(),
        delivered,
        "Broadcast text frame"
    );
    delivered
}

/// Ask every connection to close with the given code and reason.
pub fn close_all(registry: &ConnectionRegistry, close_code: u16, reason: &str) {
    for connection in registry.snapshot() {
        if let Err(e) = connection.close(close_code, reason) {
            tracing::debug!(
                connection_id = %connection.id(),
                error = %e,
                "Close frame not delivered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::tests::test_connection;

    fn text_of(msg: Message) -> String {
        match msg {
            Message::Text(t) => t.as_str().to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_every_member_exactly_once() {
        let registry = ConnectionRegistry::new();
        let (c, mut rx_c) = test_connection();
        let (d, mut rx_d) = test_connection();
        let (e, mut rx_e) = test_connection();
        for conn in [&c, &d, &e] {
            registry.register(conn.clone());
        }

        assert_eq!(broadcast_to_all(&registry, "Alice:hi"), 3);

        for rx in [&mut rx_c, &mut rx_d, &mut rx_e] {
            assert_eq!(text_of(rx.try_recv().unwrap()), "Alice:hi");
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn closed_recipient_does_not_stop_fan_out() {
        let registry = ConnectionRegistry::new();
        let (gone, rx_gone) = test_connection();
        let (alive, mut rx_alive) = test_connection();
        registry.register(gone);
        registry.register(alive);
        drop(rx_gone);

        assert_eq!(broadcast_to_all(&registry, "Bob:yo"), 1);
        assert_eq!(text_of(rx_alive.try_recv().unwrap()), "Bob:yo");
    }

    #[test]
    fn close_all_sends_close_frames() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = test_connection();
        registry.register(a);

        close_all(&registry, 1001, "Server shutting down");
        match rx_a.try_recv().unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1001);
                assert_eq!(frame.reason.as_str(), "Server shutting down");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[test]
    fn close_all_skips_closed_connections() {
        let registry = ConnectionRegistry::new();
        let (gone, rx_gone) = test_connection();
        let (alive, mut rx_alive) = test_connection();
        registry.register(gone);
        registry.register(alive);
        drop(rx_gone);

        close_all(&registry, 1001, "Server shutting down");
        assert!(matches!(
            rx_alive.try_recv().unwrap(),
            Message::Close(Some(frame)) if frame.code == 1001
        ));
    }
}

//! Inbound frame reader
//!
//! Turns server frames into `LinkEvent`s for the consumer. Returns the
//! error that ended the stream so the connection manager can tear down.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use gs_core::ConnectionError;
use gs_protocol::{ResponseCodec, ServerResponse};

use crate::event::LinkEvent;

/// Read frames until the stream fails, goes quiet for `read_timeout`, or
/// the consumer goes away
pub async fn read_frames<R>(
    reader: R,
    read_timeout: Duration,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> ConnectionError
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, ResponseCodec::new());

    loop {
        let frame = match tokio::time::timeout(read_timeout, frames.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return e.into(),
            Ok(None) => return ConnectionError::PeerClosed,
            Err(_) => return ConnectionError::ReadTimeout(read_timeout),
        };

        if events.send(to_event(frame)).is_err() {
            return ConnectionError::HealthCheckFailed("event consumer gone".to_string());
        }
    }
}

/// Map a server frame to the consumer event it represents
pub fn to_event(response: ServerResponse) -> LinkEvent {
    match response {
        ServerResponse::Status(text) => {
            tracing::debug!("Server status: {}", text);
            LinkEvent::Status { text }
        }
        ServerResponse::LocationUpdate(location) => {
            tracing::trace!(
                "Location {:.6},{:.6} ({} satellites, {:.1}s old)",
                location.latitude,
                location.longitude,
                location.satellites,
                location.location_age
            );
            LinkEvent::LocationReceived { location }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use gs_protocol::{LocationUpdate, ProtocolError};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::Encoder;

    fn frame(response: &ServerResponse) -> Vec<u8> {
        let mut buf = BytesMut::new();
        ResponseCodec::new().encode(response, &mut buf).unwrap();
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_frames_become_events() {
        let (mut server, client) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut update = LocationUpdate::new(5, 1.0, 2.0, "gps");
        update.altitude = Some(0.0);
        server
            .write_all(&frame(&ServerResponse::Status("Waiting for location...".into())))
            .await
            .unwrap();
        server
            .write_all(&frame(&ServerResponse::from(update.clone())))
            .await
            .unwrap();
        drop(server);

        let error = read_frames(client, Duration::from_secs(5), &tx).await;
        assert!(matches!(error, ConnectionError::PeerClosed));

        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Status {
                text: "Waiting for location...".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::LocationReceived { location: update })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_is_liveness_failure() {
        let (_server, client) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::unbounded_channel();

        let error = read_frames(client, Duration::from_millis(2000), &tx).await;
        assert!(matches!(error, ConnectionError::ReadTimeout(_)));
        assert!(error.is_liveness());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let (mut server, client) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let bytes = frame(&ServerResponse::Status("partial".into()));
        server.write_all(&bytes[..bytes.len() - 2]).await.unwrap();
        drop(server);

        let error = read_frames(client, Duration::from_secs(5), &tx).await;
        assert!(matches!(error, ConnectionError::Io(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_corrupt_frame_is_protocol_error() {
        let (mut server, client) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::unbounded_channel();

        server.write_all(&[0, 0, 0, 4, 0xff, 0xff, 0xff, 0xff]).await.unwrap();

        let error = read_frames(client, Duration::from_secs(5), &tx).await;
        assert!(matches!(
            error,
            ConnectionError::Protocol(ProtocolError::Serialization(_))
        ));
    }
}

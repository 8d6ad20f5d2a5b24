// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

use crate::message::{ControlMessage, ProtocolError};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Async frame reader for the injector side of a control pipe.
pub struct FrameReader<R> {
    inner: FramedRead<R, LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader {
            inner: FramedRead::new(reader, LengthDelimitedCodec::new()),
        }
    }

    /// Receives the next control frame. `Ok(None)` means the peer closed the
    /// pipe. An unknown frame surfaces as `ProtocolError::UnknownFrame`; the
    /// stream stays usable, so callers can discard and keep listening.
    pub async fn recv(&mut self) -> Result<Option<ControlMessage>, ProtocolError> {
        match self.inner.next().await {
            None => Ok(None),
            Some(frame) => Ok(Some(ControlMessage::from_wire(&frame?)?)),
        }
    }
}

/// Async frame writer for the injector side of a control pipe.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        FrameWriter {
            inner: FramedWrite::new(writer, LengthDelimitedCodec::new()),
        }
    }

    pub async fn send(&mut self, message: ControlMessage) -> Result<(), ProtocolError> {
        self.inner
            .send(Bytes::from_static(message.wire_name().as_bytes()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (near, far) = tokio::io::duplex(256);
        let (far_read, _far_write) = tokio::io::split(far);
        let (_near_read, near_write) = tokio::io::split(near);

        let mut writer = FrameWriter::new(near_write);
        let mut reader = FrameReader::new(far_read);

        writer.send(ControlMessage::SetupDone).await.unwrap();
        writer.send(ControlMessage::StartInjecting).await.unwrap();
        writer.send(ControlMessage::Shutdown).await.unwrap();

        assert_eq!(reader.recv().await.unwrap(), Some(ControlMessage::SetupDone));
        assert_eq!(
            reader.recv().await.unwrap(),
            Some(ControlMessage::StartInjecting)
        );
        assert_eq!(reader.recv().await.unwrap(), Some(ControlMessage::Shutdown));
    }

    #[tokio::test]
    async fn closed_pipe_reads_as_none() {
        let (near, far) = tokio::io::duplex(64);
        let (far_read, _far_write) = tokio::io::split(far);
        drop(near);
        let mut reader = FrameReader::new(far_read);
        assert_eq!(reader.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_frame_is_an_error_but_not_fatal() {
        let (near, far) = tokio::io::duplex(256);
        let (far_read, _far_write) = tokio::io::split(far);
        let (_near_read, near_write) = tokio::io::split(near);

        let mut raw = FramedWrite::new(near_write, LengthDelimitedCodec::new());
        raw.send(Bytes::from_static(b"m_nonsense")).await.unwrap();
        raw.send(Bytes::from_static(b"m_faultinjector_next"))
            .await
            .unwrap();

        let mut reader = FrameReader::new(far_read);
        assert!(matches!(
            reader.recv().await,
            Err(ProtocolError::UnknownFrame(_))
        ));
        assert_eq!(
            reader.recv().await.unwrap(),
            Some(ControlMessage::StartNextRun)
        );
    }
}

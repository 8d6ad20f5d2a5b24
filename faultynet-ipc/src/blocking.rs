// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Starter-side transport. The emulator API is synchronous, so this side
//! reads and writes the control pipes with plain blocking I/O, buffering
//! partial frames in a [`BytesMut`] and decoding with the same
//! length-delimited codec the injector uses. `poll` flips the inbound fd to
//! O_NONBLOCK for the duration of one drain, which is what `is_active` needs
//! to check for a pending `InjectionDone` without stalling the emulator.

use crate::message::{ControlMessage, ProtocolError};
use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

#[cfg(unix)]
use nix::fcntl::{fcntl, FcntlArg::F_GETFL, FcntlArg::F_SETFL, OFlag};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

const READ_CHUNK: usize = 4096;

pub struct BlockingTransport<R, W> {
    reader: R,
    writer: W,
    codec: LengthDelimitedCodec,
    buf: BytesMut,
}

impl<R: Read, W: Write> BlockingTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        BlockingTransport {
            reader,
            writer,
            codec: LengthDelimitedCodec::new(),
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn send(&mut self, message: ControlMessage) -> Result<(), ProtocolError> {
        let mut out = BytesMut::new();
        self.codec
            .encode(Bytes::from_static(message.wire_name().as_bytes()), &mut out)?;
        self.writer.write_all(&out)?;
        self.writer.flush()?;
        Ok(())
    }

    fn decode_buffered(&mut self) -> Result<Option<ControlMessage>, ProtocolError> {
        match self.codec.decode(&mut self.buf)? {
            Some(frame) => Ok(Some(ControlMessage::from_wire(&frame)?)),
            None => Ok(None),
        }
    }

    /// Blocks until the next frame arrives. A closed pipe is an error: the
    /// injector exited without completing the exchange.
    pub fn recv(&mut self) -> Result<ControlMessage, ProtocolError> {
        loop {
            if let Some(message) = self.decode_buffered()? {
                return Ok(message);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                return Err(ProtocolError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(unix)]
impl<R: Read + AsRawFd, W: Write> BlockingTransport<R, W> {
    /// Non-blocking check for a pending frame. Returns `Ok(None)` when the
    /// pipe holds no complete frame right now.
    pub fn poll(&mut self) -> Result<Option<ControlMessage>, ProtocolError> {
        if let Some(message) = self.decode_buffered()? {
            return Ok(Some(message));
        }
        let fd = self.reader.as_raw_fd();
        set_nonblocking(fd, true)?;
        let drained = self.drain_available();
        set_nonblocking(fd, false)?;
        drained?;
        self.decode_buffered()
    }

    fn drain_available(&mut self) -> Result<(), ProtocolError> {
        loop {
            let mut chunk = [0u8; READ_CHUNK];
            match self.reader.read(&mut chunk) {
                Ok(0) => return Err(ProtocolError::Closed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(unix)]
fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, F_GETFL)?);
    let flags = if nonblocking {
        flags | OFlag::O_NONBLOCK
    } else {
        flags & !OFlag::O_NONBLOCK
    };
    fcntl(fd, F_SETFL(flags))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(messages: &[ControlMessage]) -> Vec<u8> {
        let mut codec = LengthDelimitedCodec::new();
        let mut out = BytesMut::new();
        for message in messages {
            codec
                .encode(Bytes::from_static(message.wire_name().as_bytes()), &mut out)
                .unwrap();
        }
        out.to_vec()
    }

    #[test]
    fn recv_decodes_codec_framed_messages() {
        let wire = encoded(&[ControlMessage::SetupDone, ControlMessage::InjectionDone]);
        let mut transport = BlockingTransport::new(Cursor::new(wire), Vec::new());
        assert_eq!(transport.recv().unwrap(), ControlMessage::SetupDone);
        assert_eq!(transport.recv().unwrap(), ControlMessage::InjectionDone);
        assert!(matches!(transport.recv(), Err(ProtocolError::Closed)));
    }

    #[test]
    fn send_produces_codec_compatible_frames() {
        let mut transport = BlockingTransport::new(Cursor::new(Vec::new()), Vec::new());
        transport.send(ControlMessage::StartInjecting).unwrap();
        transport.send(ControlMessage::Shutdown).unwrap();

        let mut codec = LengthDelimitedCodec::new();
        let mut buf = BytesMut::from(&transport.writer[..]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], b"m_faultinjector_go");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&second[..], b"m_write_logs");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn poll_returns_none_on_an_idle_pipe() {
        let (reader, mut writer) = os_pipe::pipe().unwrap();
        let mut transport = BlockingTransport::new(reader, Vec::new());
        assert!(transport.poll().unwrap().is_none());

        writer
            .write_all(&encoded(&[ControlMessage::InjectionDone]))
            .unwrap();
        assert_eq!(
            transport.poll().unwrap(),
            Some(ControlMessage::InjectionDone)
        );
        assert!(transport.poll().unwrap().is_none());
    }
}

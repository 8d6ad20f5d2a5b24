// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// The closed set of control frames. The wire names are fixed byte strings;
/// note that `Shutdown` travels as `m_write_logs` for compatibility with the
/// original log-flush semantics of that message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Injector → starter: setup finished, ready for `StartInjecting`.
    SetupDone,
    /// Starter → injector: begin the injection run.
    StartInjecting,
    /// Injector → starter: all injector tasks completed.
    InjectionDone,
    /// Starter → injector: advance a manual-mode strategy by one iteration.
    StartNextRun,
    /// Starter → injector: deactivate, flush logs and exit.
    Shutdown,
}

impl ControlMessage {
    pub const fn wire_name(self) -> &'static str {
        match self {
            ControlMessage::SetupDone => "m_faultinjector_ready",
            ControlMessage::StartInjecting => "m_faultinjector_go",
            ControlMessage::InjectionDone => "m_faultinjector_done",
            ControlMessage::StartNextRun => "m_faultinjector_next",
            ControlMessage::Shutdown => "m_write_logs",
        }
    }

    pub fn from_wire(frame: &[u8]) -> Result<ControlMessage, ProtocolError> {
        match frame {
            b"m_faultinjector_ready" => Ok(ControlMessage::SetupDone),
            b"m_faultinjector_go" => Ok(ControlMessage::StartInjecting),
            b"m_faultinjector_done" => Ok(ControlMessage::InjectionDone),
            b"m_faultinjector_next" => Ok(ControlMessage::StartNextRun),
            b"m_write_logs" => Ok(ControlMessage::Shutdown),
            other => Err(ProtocolError::UnknownFrame(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A frame outside the closed message set. Dispositon is the receiver's
    /// call: discard mid-stream, terminate on the first frame.
    #[error("unknown control frame: '{0}'")]
    UnknownFrame(String),
    #[error("control pipe closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

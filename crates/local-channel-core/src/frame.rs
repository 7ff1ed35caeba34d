//! Frames exchanged between channels

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::format::Format;

/// Control frame subclasses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    Hangup,
    Ring,
    Ringing,
    Answer,
    Busy,
    Congestion,
    Progress,
    Proceeding,
    Hold,
    Unhold,
    VidUpdate,
    SrcUpdate,
    SrcChange,
    ConnectedLine,
    Redirecting,
    T38Parameters,
    Other(u16),
}

/// A unit of media or signalling passed between channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Voice {
        format: Format,
        samples: u32,
        seqno: u32,
        data: Bytes,
    },
    Video {
        format: Format,
        seqno: u32,
        data: Bytes,
    },
    Control {
        control: ControlType,
        data: Bytes,
    },
    DtmfBegin {
        digit: char,
    },
    DtmfEnd {
        digit: char,
        duration_ms: u32,
    },
    Text(String),
    Html {
        subclass: i32,
        data: Bytes,
    },
    Null,
}

impl Frame {
    pub fn voice(format: Format, seqno: u32, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Frame::Voice {
            format,
            samples: data.len() as u32,
            seqno,
            data,
        }
    }

    pub fn control(control: ControlType) -> Self {
        Frame::Control {
            control,
            data: Bytes::new(),
        }
    }

    pub fn control_with_data(control: ControlType, data: impl Into<Bytes>) -> Self {
        Frame::Control {
            control,
            data: data.into(),
        }
    }

    /// A HANGUP control frame carrying the hangup cause
    pub fn hangup(cause: u32) -> Self {
        Frame::Control {
            control: ControlType::Hangup,
            data: Bytes::copy_from_slice(&cause.to_be_bytes()),
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, Frame::Voice { .. } | Frame::Video { .. })
    }

    pub fn control_type(&self) -> Option<ControlType> {
        match self {
            Frame::Control { control, .. } => Some(*control),
            _ => None,
        }
    }

    pub fn is_control(&self, control: ControlType) -> bool {
        self.control_type() == Some(control)
    }

    /// Hangup cause carried by a HANGUP frame built with [`Frame::hangup`]
    pub fn hangup_cause(&self) -> Option<u32> {
        match self {
            Frame::Control {
                control: ControlType::Hangup,
                data,
            } if data.len() == 4 => Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            _ => None,
        }
    }

    /// Sequence number of a media frame
    pub fn seqno(&self) -> Option<u32> {
        match self {
            Frame::Voice { seqno, .. } | Frame::Video { seqno, .. } => Some(*seqno),
            _ => None,
        }
    }
}

//! Wire layout of DRLC command payloads and of ReportEventStatus.
//!
//! All multi-byte fields are little endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::types::{CancelControl, EventControl, EventStatus, LoadControlEvent};
use super::{ClientCommand, ServerCommand};
use crate::error::CodecError;
use crate::zcl::{FRAME_CONTROL_SERVER_TO_CLIENT, FRAME_TYPE_CLUSTER_SPECIFIC, ZclHeader};

/// Signature type placed in every ReportEventStatus.
pub const SIGNATURE_TYPE_RESERVED: u8 = 0x00;
/// Length of the legacy signature block.
pub const SIGNATURE_LEN: usize = 42;

const LOAD_CONTROL_EVENT_LEN: usize = 23;
const CANCEL_LEN: usize = 12;
const CANCEL_ALL_LEN: usize = 1;
const REPORT_FIXED_LEN: usize = 18;

/// Payload of LoadControlEvent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadControlEventCommand {
    pub event_id: u32,
    pub device_class: u16,
    pub utility_enrollment_group: u8,
    pub start_time: u32,
    pub duration: u16,
    pub criticality_level: u8,
    pub cooling_temp_offset: u8,
    pub heating_temp_offset: u8,
    pub cooling_temp_set_point: i16,
    pub heating_temp_set_point: i16,
    pub avg_load_percentage: u8,
    pub duty_cycle: u8,
    pub event_control: EventControl,
}

/// Payload of CancelLoadControlEvent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CancelCommand {
    pub event_id: u32,
    pub device_class: u16,
    pub utility_enrollment_group: u8,
    pub cancel_control: CancelControl,
    pub effective_time: u32,
}

/// A decoded server-to-client DRLC command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrlcCommand {
    LoadControlEvent(LoadControlEventCommand),
    Cancel(CancelCommand),
    CancelAll { cancel_control: CancelControl },
}

fn ensure(what: &'static str, buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            what,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

impl DrlcCommand {
    /// Decodes the payload of server command `command_id`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownCommand` for ids outside the cluster and
    /// `CodecError::Truncated` for short payloads. Trailing bytes are ignored.
    pub fn decode(command_id: u8, payload: &[u8]) -> Result<Self, CodecError> {
        let mut buf = payload;
        match command_id {
            x if x == ServerCommand::LoadControlEvent as u8 => {
                ensure("load control event", buf, LOAD_CONTROL_EVENT_LEN)?;
                Ok(Self::LoadControlEvent(LoadControlEventCommand {
                    event_id: buf.get_u32_le(),
                    device_class: buf.get_u16_le(),
                    utility_enrollment_group: buf.get_u8(),
                    start_time: buf.get_u32_le(),
                    duration: buf.get_u16_le(),
                    criticality_level: buf.get_u8(),
                    cooling_temp_offset: buf.get_u8(),
                    heating_temp_offset: buf.get_u8(),
                    cooling_temp_set_point: buf.get_i16_le(),
                    heating_temp_set_point: buf.get_i16_le(),
                    avg_load_percentage: buf.get_u8(),
                    duty_cycle: buf.get_u8(),
                    event_control: EventControl::from_bits_truncate(buf.get_u8()),
                }))
            }
            x if x == ServerCommand::CancelLoadControlEvent as u8 => {
                ensure("cancel load control event", buf, CANCEL_LEN)?;
                Ok(Self::Cancel(CancelCommand {
                    event_id: buf.get_u32_le(),
                    device_class: buf.get_u16_le(),
                    utility_enrollment_group: buf.get_u8(),
                    cancel_control: CancelControl::from_bits_truncate(buf.get_u8()),
                    effective_time: buf.get_u32_le(),
                }))
            }
            x if x == ServerCommand::CancelAllLoadControlEvents as u8 => {
                ensure("cancel all load control events", buf, CANCEL_ALL_LEN)?;
                Ok(Self::CancelAll {
                    cancel_control: CancelControl::from_bits_truncate(buf.get_u8()),
                })
            }
            other => Err(CodecError::UnknownCommand(other)),
        }
    }

    pub fn command_id(&self) -> u8 {
        match self {
            Self::LoadControlEvent(_) => ServerCommand::LoadControlEvent as u8,
            Self::Cancel(_) => ServerCommand::CancelLoadControlEvent as u8,
            Self::CancelAll { .. } => ServerCommand::CancelAllLoadControlEvents as u8,
        }
    }

    /// Encodes the command as an ESI would send it.
    pub fn encode(&self, sequence: u8) -> Bytes {
        let mut buf = BytesMut::with_capacity(ZclHeader::LEN + LOAD_CONTROL_EVENT_LEN);
        ZclHeader {
            frame_control: FRAME_TYPE_CLUSTER_SPECIFIC | FRAME_CONTROL_SERVER_TO_CLIENT,
            sequence,
            command_id: self.command_id(),
        }
        .put(&mut buf);
        match self {
            Self::LoadControlEvent(c) => {
                buf.put_u32_le(c.event_id);
                buf.put_u16_le(c.device_class);
                buf.put_u8(c.utility_enrollment_group);
                buf.put_u32_le(c.start_time);
                buf.put_u16_le(c.duration);
                buf.put_u8(c.criticality_level);
                buf.put_u8(c.cooling_temp_offset);
                buf.put_u8(c.heating_temp_offset);
                buf.put_i16_le(c.cooling_temp_set_point);
                buf.put_i16_le(c.heating_temp_set_point);
                buf.put_u8(c.avg_load_percentage);
                buf.put_u8(c.duty_cycle);
                buf.put_u8(c.event_control.bits());
            }
            Self::Cancel(c) => {
                buf.put_u32_le(c.event_id);
                buf.put_u16_le(c.device_class);
                buf.put_u8(c.utility_enrollment_group);
                buf.put_u8(c.cancel_control.bits());
                buf.put_u32_le(c.effective_time);
            }
            Self::CancelAll { cancel_control } => buf.put_u8(cancel_control.bits()),
        }
        buf.freeze()
    }
}

/// ReportEventStatus body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEventStatus {
    pub event_id: u32,
    pub status: EventStatus,
    pub status_time: u32,
    pub criticality_level: u8,
    pub cooling_temp_set_point: i16,
    pub heating_temp_set_point: i16,
    pub avg_load_percentage: u8,
    pub duty_cycle: u8,
    pub event_control: u8,
}

impl ReportEventStatus {
    pub fn new(event: &LoadControlEvent, status: EventStatus, status_time: u32) -> Self {
        Self {
            event_id: event.event_id,
            status,
            status_time,
            criticality_level: event.criticality_level,
            cooling_temp_set_point: event.cooling_temp_set_point,
            heating_temp_set_point: event.heating_temp_set_point,
            avg_load_percentage: event.avg_load_percentage,
            duty_cycle: event.duty_cycle,
            event_control: event.event_control.bits(),
        }
    }

    /// Encoded frame length, header and signature included.
    pub const FRAME_LEN: usize = ZclHeader::LEN + REPORT_FIXED_LEN + 1 + SIGNATURE_LEN;

    /// Encodes a client-to-server frame with the reserved signature block.
    pub fn encode(&self, sequence: u8) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::FRAME_LEN);
        ZclHeader {
            frame_control: FRAME_TYPE_CLUSTER_SPECIFIC,
            sequence,
            command_id: ClientCommand::ReportEventStatus as u8,
        }
        .put(&mut buf);
        buf.put_u32_le(self.event_id);
        buf.put_u8(self.status.code());
        buf.put_u32_le(self.status_time);
        buf.put_u8(self.criticality_level);
        buf.put_i16_le(self.cooling_temp_set_point);
        buf.put_i16_le(self.heating_temp_set_point);
        buf.put_u8(self.avg_load_percentage);
        buf.put_u8(self.duty_cycle);
        buf.put_u8(self.event_control);
        buf.put_u8(SIGNATURE_TYPE_RESERVED);
        buf.put_bytes(0xFF, SIGNATURE_LEN);
        buf.freeze()
    }

    /// Parses a ReportEventStatus frame; the signature block is not checked.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the frame is not a ReportEventStatus, is
    /// truncated, or carries an undefined status code.
    pub fn decode(frame: &[u8]) -> Result<(ZclHeader, Self), CodecError> {
        let (header, mut buf) = ZclHeader::parse(frame)?;
        if !header.is_cluster_specific() || header.is_server_to_client() {
            return Err(CodecError::UnsupportedFrame(header.frame_control));
        }
        if header.command_id != ClientCommand::ReportEventStatus as u8 {
            return Err(CodecError::UnknownCommand(header.command_id));
        }
        ensure("report event status", buf, REPORT_FIXED_LEN)?;
        let event_id = buf.get_u32_le();
        let code = buf.get_u8();
        let status = EventStatus::from_code(code).ok_or(CodecError::InvalidValue {
            what: "event status",
            value: code,
        })?;
        Ok((
            header,
            Self {
                event_id,
                status,
                status_time: buf.get_u32_le(),
                criticality_level: buf.get_u8(),
                cooling_temp_set_point: buf.get_i16_le(),
                heating_temp_set_point: buf.get_i16_le(),
                avg_load_percentage: buf.get_u8(),
                duty_cycle: buf.get_u8(),
                event_control: buf.get_u8(),
            },
        ))
    }
}

/// Encodes GetScheduledEvents, asking an ESI to resend pending events.
pub fn encode_get_scheduled_events(sequence: u8, start_time: u32, number_of_events: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(ZclHeader::LEN + 5);
    ZclHeader {
        frame_control: FRAME_TYPE_CLUSTER_SPECIFIC,
        sequence,
        command_id: ClientCommand::GetScheduledEvents as u8,
    }
    .put(&mut buf);
    buf.put_u32_le(start_time);
    buf.put_u8(number_of_events);
    buf.freeze()
}

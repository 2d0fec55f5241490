//! MAVLink FTP wire format
//!
//! FILE_TRANSFER_PROTOCOL carries a 251-byte payload:
//!
//! ```text
//! offset  size  field
//!      0     2  seq_number (LE)
//!      2     1  session
//!      3     1  opcode
//!      4     1  size (valid bytes in data)
//!      5     1  req_opcode (replies only)
//!      6     1  burst_complete
//!      7     1  padding
//!      8     4  offset (LE)
//!     12   239  data
//! ```

use mavlink::common::{MavMessage, FILE_TRANSFER_PROTOCOL_DATA};

/// FILE_TRANSFER_PROTOCOL payload length
pub const FTP_PAYLOAD_LEN: usize = 251;

/// Header bytes ahead of `data`
pub const FTP_HEADER_LEN: usize = 12;

/// Usable data bytes per packet
pub const FTP_MAX_DATA: usize = FTP_PAYLOAD_LEN - FTP_HEADER_LEN;

/// FTP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FtpOpcode {
    None,
    TerminateSession,
    ResetSessions,
    ListDirectory,
    OpenFileRO,
    ReadFile,
    CreateFile,
    WriteFile,
    RemoveFile,
    CreateDirectory,
    RemoveDirectory,
    OpenFileWO,
    TruncateFile,
    Rename,
    CalcFileCRC32,
    BurstReadFile,
    Ack,
    Nack,
    /// Opcode this implementation does not know
    Unknown(u8),
}

impl From<u8> for FtpOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => FtpOpcode::None,
            1 => FtpOpcode::TerminateSession,
            2 => FtpOpcode::ResetSessions,
            3 => FtpOpcode::ListDirectory,
            4 => FtpOpcode::OpenFileRO,
            5 => FtpOpcode::ReadFile,
            6 => FtpOpcode::CreateFile,
            7 => FtpOpcode::WriteFile,
            8 => FtpOpcode::RemoveFile,
            9 => FtpOpcode::CreateDirectory,
            10 => FtpOpcode::RemoveDirectory,
            11 => FtpOpcode::OpenFileWO,
            12 => FtpOpcode::TruncateFile,
            13 => FtpOpcode::Rename,
            14 => FtpOpcode::CalcFileCRC32,
            15 => FtpOpcode::BurstReadFile,
            128 => FtpOpcode::Ack,
            129 => FtpOpcode::Nack,
            other => FtpOpcode::Unknown(other),
        }
    }
}

impl From<FtpOpcode> for u8 {
    fn from(opcode: FtpOpcode) -> Self {
        match opcode {
            FtpOpcode::None => 0,
            FtpOpcode::TerminateSession => 1,
            FtpOpcode::ResetSessions => 2,
            FtpOpcode::ListDirectory => 3,
            FtpOpcode::OpenFileRO => 4,
            FtpOpcode::ReadFile => 5,
            FtpOpcode::CreateFile => 6,
            FtpOpcode::WriteFile => 7,
            FtpOpcode::RemoveFile => 8,
            FtpOpcode::CreateDirectory => 9,
            FtpOpcode::RemoveDirectory => 10,
            FtpOpcode::OpenFileWO => 11,
            FtpOpcode::TruncateFile => 12,
            FtpOpcode::Rename => 13,
            FtpOpcode::CalcFileCRC32 => 14,
            FtpOpcode::BurstReadFile => 15,
            FtpOpcode::Ack => 128,
            FtpOpcode::Nack => 129,
            FtpOpcode::Unknown(other) => other,
        }
    }
}

/// FTP NAK error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FtpError {
    None = 0,
    Fail = 1,
    /// Storage error; the OS errno follows in the NAK payload
    FailErrno = 2,
    InvalidDataSize = 3,
    InvalidSession = 4,
    NoSessionsAvailable = 5,
    EndOfFile = 6,
    UnknownCommand = 7,
    FileExists = 8,
    FileProtected = 9,
    FileNotFound = 10,
}

/// One FTP request or reply with its routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpPacket {
    /// Link the request arrived on / the reply leaves on
    pub channel: u8,
    /// Peer system id
    pub sysid: u8,
    /// Peer component id
    pub compid: u8,
    pub seq_number: u16,
    pub session: u8,
    pub opcode: FtpOpcode,
    pub size: u8,
    pub req_opcode: FtpOpcode,
    pub burst_complete: bool,
    pub offset: u32,
    pub data: [u8; FTP_MAX_DATA],
}

impl FtpPacket {
    /// Empty packet addressed to a peer
    pub fn new(channel: u8, sysid: u8, compid: u8) -> Self {
        Self {
            channel,
            sysid,
            compid,
            seq_number: 0,
            session: 0,
            opcode: FtpOpcode::None,
            size: 0,
            req_opcode: FtpOpcode::None,
            burst_complete: false,
            offset: 0,
            data: [0; FTP_MAX_DATA],
        }
    }

    /// Decode an inbound payload
    pub fn decode(channel: u8, sysid: u8, compid: u8, payload: &[u8; FTP_PAYLOAD_LEN]) -> Self {
        let mut data = [0u8; FTP_MAX_DATA];
        data.copy_from_slice(&payload[FTP_HEADER_LEN..]);
        Self {
            channel,
            sysid,
            compid,
            seq_number: u16::from_le_bytes([payload[0], payload[1]]),
            session: payload[2],
            opcode: FtpOpcode::from(payload[3]),
            size: payload[4],
            req_opcode: FtpOpcode::from(payload[5]),
            burst_complete: payload[6] != 0,
            offset: u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
            data,
        }
    }

    /// Encode to the 251-byte wire payload
    pub fn encode(&self) -> [u8; FTP_PAYLOAD_LEN] {
        let mut payload = [0u8; FTP_PAYLOAD_LEN];
        payload[0..2].copy_from_slice(&self.seq_number.to_le_bytes());
        payload[2] = self.session;
        payload[3] = self.opcode.into();
        payload[4] = self.size;
        payload[5] = self.req_opcode.into();
        payload[6] = u8::from(self.burst_complete);
        payload[8..12].copy_from_slice(&self.offset.to_le_bytes());
        payload[FTP_HEADER_LEN..].copy_from_slice(&self.data);
        payload
    }

    /// Build the FILE_TRANSFER_PROTOCOL message for this packet
    pub fn to_message(&self) -> MavMessage {
        MavMessage::FILE_TRANSFER_PROTOCOL(FILE_TRANSFER_PROTOCOL_DATA {
            target_network: 0,
            target_system: self.sysid,
            target_component: self.compid,
            payload: self.encode(),
        })
    }

    /// The valid part of `data`
    pub fn payload_data(&self) -> &[u8] {
        &self.data[..usize::from(self.size).min(FTP_MAX_DATA)]
    }

    /// Start a reply to this request: routing and session echoed,
    /// `seq_number` advanced by one, `req_opcode` set.
    pub fn reply_template(&self) -> Self {
        let mut reply = Self::new(self.channel, self.sysid, self.compid);
        reply.seq_number = self.seq_number.wrapping_add(1);
        reply.session = self.session;
        reply.req_opcode = self.opcode;
        reply.offset = self.offset;
        reply
    }

    /// Turn this packet into an ACK carrying `data`
    pub fn ack(mut self, data: &[u8]) -> Self {
        let len = data.len().min(FTP_MAX_DATA);
        self.opcode = FtpOpcode::Ack;
        self.data[..len].copy_from_slice(&data[..len]);
        self.size = len as u8;
        self
    }

    /// Turn this packet into a NAK.
    ///
    /// `FailErrno` carries the errno as a second data byte.
    pub fn nak(mut self, error: FtpError, errno: u8) -> Self {
        self.opcode = FtpOpcode::Nack;
        self.data[0] = error as u8;
        if error == FtpError::FailErrno {
            self.data[1] = errno;
            self.size = 2;
        } else {
            self.size = 1;
        }
        self
    }

    /// NAK error code, if this is a NAK
    pub fn nak_error(&self) -> Option<u8> {
        (self.opcode == FtpOpcode::Nack).then_some(self.data[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(u8::from(FtpOpcode::OpenFileRO), 4);
        assert_eq!(u8::from(FtpOpcode::BurstReadFile), 15);
        assert_eq!(u8::from(FtpOpcode::Ack), 128);
        assert_eq!(FtpOpcode::from(129), FtpOpcode::Nack);
        assert_eq!(FtpOpcode::from(77), FtpOpcode::Unknown(77));
        assert_eq!(u8::from(FtpOpcode::Unknown(77)), 77);
    }

    #[test]
    fn test_wire_layout() {
        let mut packet = FtpPacket::new(0, 255, 190);
        packet.seq_number = 0x0102;
        packet.session = 3;
        packet.opcode = FtpOpcode::ReadFile;
        packet.size = 4;
        packet.offset = 0x0A0B0C0D;
        packet.burst_complete = true;
        packet.data[..4].copy_from_slice(b"abcd");

        let wire = packet.encode();
        assert_eq!(&wire[0..2], &[0x02, 0x01]);
        assert_eq!(wire[2], 3);
        assert_eq!(wire[3], 5);
        assert_eq!(wire[4], 4);
        assert_eq!(wire[6], 1);
        assert_eq!(&wire[8..12], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&wire[12..16], b"abcd");

        assert_eq!(FtpPacket::decode(0, 255, 190, &wire), packet);
    }

    #[test]
    fn test_reply_template_echoes_request() {
        let mut request = FtpPacket::new(2, 255, 190);
        request.seq_number = u16::MAX;
        request.session = 1;
        request.opcode = FtpOpcode::ListDirectory;
        request.offset = 7;

        let reply = request.reply_template().ack(b"D\0");
        assert_eq!(reply.seq_number, 0);
        assert_eq!(reply.session, 1);
        assert_eq!(reply.req_opcode, FtpOpcode::ListDirectory);
        assert_eq!(reply.opcode, FtpOpcode::Ack);
        assert_eq!(reply.channel, 2);
        assert_eq!(reply.payload_data(), b"D\0");
    }

    #[test]
    fn test_nak_payload() {
        let request = FtpPacket::new(0, 1, 1);
        let nak = request.reply_template().nak(FtpError::FileNotFound, 0);
        assert_eq!(nak.size, 1);
        assert_eq!(nak.nak_error(), Some(FtpError::FileNotFound as u8));

        let nak = request.reply_template().nak(FtpError::FailErrno, 28);
        assert_eq!(nak.size, 2);
        assert_eq!(nak.payload_data(), &[2, 28]);
    }

    #[test]
    fn test_to_message_targets_peer() {
        let packet = FtpPacket::new(0, 42, 7);
        let MavMessage::FILE_TRANSFER_PROTOCOL(data) = packet.to_message() else {
            panic!("Expected FILE_TRANSFER_PROTOCOL message");
        };
        assert_eq!(data.target_system, 42);
        assert_eq!(data.target_component, 7);
        assert_eq!(data.payload.len(), FTP_PAYLOAD_LEN);
    }
}

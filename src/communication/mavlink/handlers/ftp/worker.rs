//! FTP request execution
//!
//! Runs on the background worker. Owns the file system and the one open
//! session. Each [`FtpWorker::poll`] does a bounded amount of work: one
//! request, one burst chunk or one slice of a CRC scan.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use super::fs::{map_io_error, EntryKind, FileSystem, OpenMode};
use super::protocol::{FtpError, FtpOpcode, FtpPacket, FTP_MAX_DATA};
use super::{FtpService, DEFAULT_SESSION_TIMEOUT_MS};
use crate::{log_debug, log_info, log_warn};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Bytes fed to the CRC per poll
const CRC_BYTES_PER_POLL: usize = 32 * 1024;

const CRC_READ_CHUNK: usize = 4096;

/// A NAK to send instead of an ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nak {
    error: FtpError,
    errno: u8,
}

impl From<FtpError> for Nak {
    fn from(error: FtpError) -> Self {
        Self { error, errno: 0 }
    }
}

impl From<io::Error> for Nak {
    fn from(err: io::Error) -> Self {
        let (error, errno) = map_io_error(&err);
        Self { error, errno }
    }
}

struct OpenSession<File> {
    id: u8,
    file: File,
    mode: OpenMode,
}

enum Job<File> {
    Burst {
        request: FtpPacket,
        offset: u32,
        seq_number: u16,
        max_read: usize,
    },
    Crc {
        request: FtpPacket,
        file: File,
        digest: Digest<'static, u32>,
    },
}

/// Executes FTP requests queued on an [`FtpService`]
pub struct FtpWorker<F: FileSystem> {
    service: Arc<FtpService>,
    fs: F,
    session: Option<OpenSession<F::File>>,
    next_session_id: u8,
    last_reply: Option<FtpPacket>,
    last_activity_ms: u64,
    session_timeout_ms: u64,
    job: Option<Job<F::File>>,
}

impl<F: FileSystem> FtpWorker<F> {
    pub fn new(service: Arc<FtpService>, fs: F) -> Self {
        Self {
            service,
            fs,
            session: None,
            next_session_id: 0,
            last_reply: None,
            last_activity_ms: 0,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            job: None,
        }
    }

    /// Change the idle timeout
    pub fn with_session_timeout(mut self, timeout_ms: u64) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    /// Id of the open session, if any
    pub fn session_id(&self) -> Option<u8> {
        self.session.as_ref().map(|s| s.id)
    }

    /// A burst read or CRC scan is in progress
    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    /// Do one bounded unit of work.
    ///
    /// # Returns
    ///
    /// `true` if anything was done; callers loop until `false` or out of time.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        self.expire_idle_session(now_ms);

        if self.job.is_some() {
            let burst = matches!(self.job, Some(Job::Burst { .. }));
            if burst && self.service.pending_requests() > 0 {
                log_debug!("FTP burst interrupted by new request");
                self.job = None;
            } else {
                self.last_activity_ms = now_ms;
                return self.step_job();
            }
        }

        let Some(request) = self.service.next_request() else {
            return false;
        };
        self.last_activity_ms = now_ms;

        if let Some(last) = self.retransmit_of(&request) {
            self.service
                .update_stats(|s| s.retransmits = s.retransmits.saturating_add(1));
            self.service.push_reply(last);
            return true;
        }

        if let Some(reply) = self.handle_request(&request) {
            self.send_reply(reply);
        }
        true
    }

    /// Last reply, if `request` is a retransmission of the request it answered
    fn retransmit_of(&self, request: &FtpPacket) -> Option<FtpPacket> {
        let last = self.last_reply.as_ref()?;
        let duplicate = last.sysid == request.sysid
            && last.compid == request.compid
            && last.session == request.session
            && last.req_opcode == request.opcode
            && request.seq_number.wrapping_add(1) == last.seq_number;
        duplicate.then(|| {
            let mut reply = last.clone();
            reply.channel = request.channel;
            reply
        })
    }

    fn send_reply(&mut self, reply: FtpPacket) {
        self.last_reply = Some(reply.clone());
        self.service.push_reply(reply);
    }

    fn handle_request(&mut self, request: &FtpPacket) -> Option<FtpPacket> {
        let reply = request.reply_template();
        let result = match request.opcode {
            FtpOpcode::None => Ok(reply.clone().ack(&[])),
            FtpOpcode::TerminateSession => self.terminate(request, reply.clone()),
            FtpOpcode::ResetSessions => {
                self.close_session("reset");
                Ok(reply.clone().ack(&[]))
            }
            FtpOpcode::ListDirectory => self.list_directory(request, reply.clone()),
            FtpOpcode::OpenFileRO => self.open(request, reply.clone(), OpenMode::Read),
            FtpOpcode::CreateFile => self.open(request, reply.clone(), OpenMode::Create),
            FtpOpcode::OpenFileWO => self.open(request, reply.clone(), OpenMode::Write),
            FtpOpcode::ReadFile => self.read(request, reply.clone()),
            FtpOpcode::WriteFile => self.write(request, reply.clone()),
            FtpOpcode::RemoveFile => path_arg(request)
                .and_then(|path| Ok(self.fs.remove_file(path)?))
                .map(|()| reply.clone().ack(&[])),
            FtpOpcode::CreateDirectory => path_arg(request)
                .and_then(|path| Ok(self.fs.create_dir(path)?))
                .map(|()| reply.clone().ack(&[])),
            FtpOpcode::RemoveDirectory => path_arg(request)
                .and_then(|path| Ok(self.fs.remove_dir(path)?))
                .map(|()| reply.clone().ack(&[])),
            FtpOpcode::TruncateFile => path_arg(request)
                .and_then(|path| Ok(self.fs.truncate(path, u64::from(request.offset))?))
                .map(|()| reply.clone().ack(&[])),
            FtpOpcode::Rename => rename_args(request)
                .and_then(|(from, to)| Ok(self.fs.rename(from, to)?))
                .map(|()| reply.clone().ack(&[])),
            FtpOpcode::CalcFileCRC32 => match self.start_crc(request) {
                Ok(()) => return None,
                Err(nak) => Err(nak),
            },
            FtpOpcode::BurstReadFile => match self.start_burst(request) {
                Ok(()) => return None,
                Err(nak) => Err(nak),
            },
            FtpOpcode::Ack | FtpOpcode::Nack | FtpOpcode::Unknown(_) => {
                Err(FtpError::UnknownCommand.into())
            }
        };

        Some(match result {
            Ok(ack) => ack,
            Err(nak) => {
                log_debug!("FTP {:?} failed: {:?}", request.opcode, nak.error);
                reply.nak(nak.error, nak.errno)
            }
        })
    }

    fn terminate(&mut self, request: &FtpPacket, reply: FtpPacket) -> Result<FtpPacket, Nak> {
        match &self.session {
            Some(session) if session.id == request.session => {
                self.close_session("terminated");
                Ok(reply.ack(&[]))
            }
            _ => Err(FtpError::InvalidSession.into()),
        }
    }

    fn open(
        &mut self,
        request: &FtpPacket,
        mut reply: FtpPacket,
        mode: OpenMode,
    ) -> Result<FtpPacket, Nak> {
        if self.session.is_some() {
            return Err(FtpError::NoSessionsAvailable.into());
        }
        let path = path_arg(request)?;
        let mut file = self.fs.open(path, mode)?;

        let size = if mode == OpenMode::Read {
            let size = file.seek(SeekFrom::End(0))?;
            file.seek(SeekFrom::Start(0))?;
            Some(size.min(u64::from(u32::MAX)) as u32)
        } else {
            None
        };

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);
        self.session = Some(OpenSession { id, file, mode });
        self.service
            .update_stats(|s| s.sessions_opened = s.sessions_opened.saturating_add(1));
        log_info!("FTP session {} opened: {}", id, path);

        reply.session = id;
        Ok(match size {
            Some(size) => reply.ack(&size.to_le_bytes()),
            None => reply.ack(&[]),
        })
    }

    fn read(&mut self, request: &FtpPacket, reply: FtpPacket) -> Result<FtpPacket, Nak> {
        self.require_mode(request, OpenMode::Read)?;
        let mut buf = [0u8; FTP_MAX_DATA];
        let len = read_len(request.size);
        let n = self.with_session(request, |session| {
            read_at(&mut session.file, request.offset, &mut buf[..len])
        })?;
        if n == 0 {
            return Err(FtpError::EndOfFile.into());
        }
        Ok(reply.ack(&buf[..n]))
    }

    fn write(&mut self, request: &FtpPacket, reply: FtpPacket) -> Result<FtpPacket, Nak> {
        if usize::from(request.size) > FTP_MAX_DATA {
            return Err(FtpError::InvalidDataSize.into());
        }
        if self.session_mode(request)? == OpenMode::Read {
            return Err(FtpError::Fail.into());
        }
        let data = request.payload_data();
        self.with_session(request, |session| {
            session.file.seek(SeekFrom::Start(u64::from(request.offset)))?;
            session.file.write_all(data)
        })?;
        Ok(reply.ack(&[]))
    }

    fn list_directory(&mut self, request: &FtpPacket, reply: FtpPacket) -> Result<FtpPacket, Nak> {
        let path = path_arg(request)?;
        let mut entries = self.fs.read_dir(path)?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let start = request.offset as usize;
        if start >= entries.len() {
            return Err(FtpError::EndOfFile.into());
        }

        let mut buf = [0u8; FTP_MAX_DATA];
        let mut used = 0;
        for entry in &entries[start..] {
            let text = match entry.kind {
                EntryKind::File => format!("F{}\t{}\0", entry.name, entry.size),
                EntryKind::Directory => format!("D{}\0", entry.name),
                EntryKind::Other => String::from("S\0"),
            };
            let bytes: &[u8] = if text.len() > FTP_MAX_DATA {
                b"S\0"
            } else {
                text.as_bytes()
            };
            if used + bytes.len() > FTP_MAX_DATA {
                break;
            }
            buf[used..used + bytes.len()].copy_from_slice(bytes);
            used += bytes.len();
        }
        Ok(reply.ack(&buf[..used]))
    }

    fn start_burst(&mut self, request: &FtpPacket) -> Result<(), Nak> {
        self.require_mode(request, OpenMode::Read)?;
        self.job = Some(Job::Burst {
            request: request.clone(),
            offset: request.offset,
            seq_number: request.seq_number.wrapping_add(1),
            max_read: read_len(request.size),
        });
        Ok(())
    }

    fn start_crc(&mut self, request: &FtpPacket) -> Result<(), Nak> {
        let path = path_arg(request)?;
        let file = self.fs.open(path, OpenMode::Read)?;
        self.job = Some(Job::Crc {
            request: request.clone(),
            file,
            digest: CRC32.digest(),
        });
        Ok(())
    }

    fn step_job(&mut self) -> bool {
        let Some(job) = self.job.take() else {
            return false;
        };
        match job {
            Job::Burst {
                request,
                offset,
                seq_number,
                max_read,
            } => self.step_burst(request, offset, seq_number, max_read),
            Job::Crc {
                request,
                file,
                digest,
            } => self.step_crc(request, file, digest),
        }
    }

    fn step_burst(&mut self, request: FtpPacket, offset: u32, seq_number: u16, max_read: usize) -> bool {
        if self.service.reply_space(request.channel) == 0 {
            self.job = Some(Job::Burst {
                request,
                offset,
                seq_number,
                max_read,
            });
            return false;
        }

        let mut reply = request.reply_template();
        reply.seq_number = seq_number;
        reply.offset = offset;

        let mut buf = [0u8; FTP_MAX_DATA];
        let result = self.with_session(&request, |session| {
            read_at(&mut session.file, offset, &mut buf[..max_read])
        });

        let reply = match result {
            Ok(0) => {
                let mut nak = reply.nak(FtpError::EndOfFile, 0);
                nak.burst_complete = true;
                nak
            }
            Ok(n) => {
                let mut ack = reply.ack(&buf[..n]);
                if n < max_read {
                    ack.burst_complete = true;
                } else {
                    self.job = Some(Job::Burst {
                        request,
                        offset: offset.saturating_add(n as u32),
                        seq_number: seq_number.wrapping_add(1),
                        max_read,
                    });
                }
                ack
            }
            Err(nak) => {
                let mut nak = reply.nak(nak.error, nak.errno);
                nak.burst_complete = true;
                nak
            }
        };
        self.send_reply(reply);
        true
    }

    fn step_crc(&mut self, request: FtpPacket, mut file: F::File, mut digest: Digest<'static, u32>) -> bool {
        if self.service.reply_space(request.channel) == 0 {
            self.job = Some(Job::Crc {
                request,
                file,
                digest,
            });
            return false;
        }

        let mut buf = [0u8; CRC_READ_CHUNK];
        let mut budget = CRC_BYTES_PER_POLL;
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    let crc = digest.finalize();
                    self.send_reply(request.reply_template().ack(&crc.to_le_bytes()));
                    return true;
                }
                Ok(n) => {
                    digest.update(&buf[..n]);
                    budget = budget.saturating_sub(n);
                    if budget == 0 {
                        self.job = Some(Job::Crc {
                            request,
                            file,
                            digest,
                        });
                        return true;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    let nak = Nak::from(err);
                    log_warn!("FTP CRC read failed, errno {}", nak.errno);
                    self.send_reply(request.reply_template().nak(nak.error, nak.errno));
                    return true;
                }
            }
        }
    }

    fn session_mode(&self, request: &FtpPacket) -> Result<OpenMode, Nak> {
        match &self.session {
            Some(session) if session.id == request.session => Ok(session.mode),
            _ => Err(FtpError::InvalidSession.into()),
        }
    }

    fn require_mode(&self, request: &FtpPacket, mode: OpenMode) -> Result<(), Nak> {
        let open = self.session_mode(request)?;
        let readable = open == OpenMode::Read;
        if readable == (mode == OpenMode::Read) {
            Ok(())
        } else {
            Err(FtpError::Fail.into())
        }
    }

    /// Run `f` on the session named by `request`.
    ///
    /// A storage error inside `f` is NAKed; it closes the session only when
    /// the file handle itself is unusable.
    fn with_session<R>(
        &mut self,
        request: &FtpPacket,
        f: impl FnOnce(&mut OpenSession<F::File>) -> io::Result<R>,
    ) -> Result<R, Nak> {
        let session = match self.session.as_mut() {
            Some(session) if session.id == request.session => session,
            _ => return Err(FtpError::InvalidSession.into()),
        };
        match f(session) {
            Ok(value) => Ok(value),
            Err(err) => {
                let fatal = is_session_fatal(&err);
                let nak = Nak::from(err);
                log_warn!(
                    "FTP session {} storage fault, errno {}",
                    request.session,
                    nak.errno
                );
                if fatal {
                    self.close_session("storage fault");
                }
                Err(nak)
            }
        }
    }

    fn close_session(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };
        if matches!(self.job, Some(Job::Burst { .. })) {
            self.job = None;
        }
        let purged = self.service.purge_session(session.id);
        log_info!(
            "FTP session {} closed ({}), {} queued requests purged",
            session.id,
            reason,
            purged
        );
    }

    fn expire_idle_session(&mut self, now_ms: u64) {
        if self.session.is_none() || self.job.is_some() {
            return;
        }
        if now_ms.saturating_sub(self.last_activity_ms) > self.session_timeout_ms {
            self.service
                .update_stats(|s| s.session_timeouts = s.session_timeouts.saturating_add(1));
            self.close_session("idle timeout");
        }
    }
}

/// Requested read length: 0 or oversize means a full packet
fn read_len(size: u8) -> usize {
    match usize::from(size) {
        0 => FTP_MAX_DATA,
        n => n.min(FTP_MAX_DATA),
    }
}

/// EBADF: the open file handle is gone
const EBADF: i32 = 9;

/// Faults after which the open handle cannot be used again
fn is_session_fatal(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EBADF)
}

/// Fill `buf` from `offset`, stopping early only at end of file
fn read_at<R: Read + Seek>(file: &mut R, offset: u32, buf: &mut [u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(u64::from(offset)))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Path carried in the request data
fn path_arg(request: &FtpPacket) -> Result<&str, Nak> {
    let size = usize::from(request.size);
    if size == 0 || size > FTP_MAX_DATA {
        return Err(FtpError::InvalidDataSize.into());
    }
    let raw = &request.data[..size];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(size);
    match core::str::from_utf8(&raw[..end]) {
        Ok(path) if !path.is_empty() => Ok(path),
        _ => Err(FtpError::InvalidDataSize.into()),
    }
}

/// `old\0new\0` pair carried by Rename
fn rename_args(request: &FtpPacket) -> Result<(&str, &str), Nak> {
    let size = usize::from(request.size);
    if size == 0 || size > FTP_MAX_DATA {
        return Err(FtpError::InvalidDataSize.into());
    }
    let raw = &request.data[..size];
    let mut parts = raw.split(|b| *b == 0).filter(|part| !part.is_empty());
    let (Some(from), Some(to)) = (parts.next(), parts.next()) else {
        return Err(FtpError::InvalidDataSize.into());
    };
    match (core::str::from_utf8(from), core::str::from_utf8(to)) {
        (Ok(from), Ok(to)) => Ok((from, to)),
        _ => Err(FtpError::InvalidDataSize.into()),
    }
}

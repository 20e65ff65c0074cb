//! The control/data channel client

use crate::entry::{RemoteEntry, RemoteEntryKind};
use crate::error::{RemoteError, Result};
use regex::Regex;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Delay before retrying a transfer the server answered with 450.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of the greeting sequence.
pub enum Connect {
    Ready(FtpClient),
    /// The server answered 421; try again later.
    TemporarilyUnavailable,
}

/// Minimal FTP client with one control channel and per-transfer data
/// channels.
pub struct FtpClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    data: Option<TcpStream>,
    last_reply: String,
}

impl FtpClient {
    /// Open the control channel and consume the greeting. A 120 greeting
    /// means the real status follows on the next reply.
    pub fn connect(host: &str, port: u16) -> Result<Connect> {
        let stream = TcpStream::connect((host, port))?;
        let writer = stream.try_clone()?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
            data: None,
            last_reply: String::new(),
        };

        let mut code = client.reply_code()?;
        if code == 120 {
            code = client.reply_code()?;
        }
        match code {
            421 => Ok(Connect::TemporarilyUnavailable),
            220 => {
                info!(host, port, "connected");
                Ok(Connect::Ready(client))
            }
            _ => Err(client.unexpected()),
        }
    }

    /// Anonymous login with the conventional credentials.
    pub fn login_anonymous(&mut self) -> Result<()> {
        self.login("anonymous", "anonymous", "noaccount")
    }

    /// The three-tier login sequence: USER, then PASS if challenged, then
    /// ACCT if challenged again.
    pub fn login(&mut self, user: &str, password: &str, account: &str) -> Result<()> {
        self.send(&format!("USER {user}"))?;
        match self.reply_code()? {
            230 => Ok(()),
            331 | 332 => {
                self.send(&format!("PASS {password}"))?;
                match self.reply_code()? {
                    202 | 230 => Ok(()),
                    332 => {
                        self.send(&format!("ACCT {account}"))?;
                        match self.reply_code()? {
                            202 | 230 => Ok(()),
                            _ => Err(self.unexpected()),
                        }
                    }
                    _ => Err(self.unexpected()),
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Select binary (image) or ASCII transfer mode.
    pub fn set_binary(&mut self, binary: bool) -> Result<()> {
        self.send(if binary { "TYPE I" } else { "TYPE A" })?;
        match self.reply_code()? {
            200 => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    /// List a remote directory. Lines that do not split into exactly nine
    /// whitespace-delimited tokens are skipped; a 550 reply yields an empty
    /// listing.
    pub fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.open_data_channel()?;
        self.send(&format!("LIST {path}"))?;

        let mut code = self.reply_code()?;
        while code == 450 {
            debug!(path, "listing busy, retrying");
            std::thread::sleep(RETRY_DELAY);
            code = self.reply_code()?;
        }
        match code {
            150 => {}
            550 => {
                self.data = None;
                return Ok(Vec::new());
            }
            _ => return Err(self.unexpected()),
        }

        let data = self.take_data()?;
        let mut entries = Vec::new();
        for line in BufReader::new(data).lines() {
            let line = line?;
            if let Some(entry) = parse_listing_line(&line)? {
                entries.push(entry);
            }
        }

        // One trailing control reply closes out the transfer.
        match self.reply_code()? {
            226 => {}
            _ => return Err(self.unexpected()),
        }

        Ok(entries)
    }

    /// Subdirectories of `directory` as joined absolute paths, filtered by
    /// an optional (fully anchored) name pattern; `.` and `..` are skipped.
    pub fn list_directories(
        &mut self,
        directory: &str,
        pattern: Option<&Regex>,
    ) -> Result<Vec<String>> {
        let entries = self.list(directory)?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                entry.kind == RemoteEntryKind::Directory
                    && entry.name != "."
                    && entry.name != ".."
                    && pattern.map(|p| p.is_match(&entry.name)).unwrap_or(true)
            })
            .map(|entry| join_remote(directory, &entry.name))
            .collect())
    }

    /// Regular files under `directory` with the given extension, as joined
    /// absolute paths.
    pub fn list_files(&mut self, directory: &str, extension: &str) -> Result<Vec<String>> {
        let entries = self.list(directory)?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                entry.kind == RemoteEntryKind::Regular && entry.name.ends_with(extension)
            })
            .map(|entry| join_remote(directory, &entry.name))
            .collect())
    }

    /// Download up to `max_bytes` of a remote file into memory. The data
    /// socket is discarded as soon as enough bytes arrived, and one control
    /// reply is consumed afterwards whatever its value.
    pub fn download_prefix(&mut self, path: &str, max_bytes: u64) -> Result<Vec<u8>> {
        self.open_data_channel()?;
        self.retr(path)?;

        let data = self.take_data()?;
        let mut buffer = Vec::new();
        data.take(max_bytes).read_to_end(&mut buffer)?;
        // Dropping the handle closes the socket mid-stream; the server's
        // transfer status still arrives on the control channel.
        let code = self.reply_code()?;
        trace!(path, bytes = buffer.len(), code, "prefix download finished");
        Ok(buffer)
    }

    /// Download a whole remote file into a sink.
    pub fn download_to<W: Write>(&mut self, path: &str, sink: &mut W) -> Result<u64> {
        self.open_data_channel()?;
        self.retr(path)?;

        let mut data = self.take_data()?;
        let copied = std::io::copy(&mut data, sink)?;
        drop(data);

        let code = self.reply_code()?;
        if code != 226 {
            warn!(path, code, reply = %self.last_reply, "unexpected status after download");
        }
        Ok(copied)
    }

    /// Close both channels, ignoring errors.
    pub fn disconnect(self) {
        let _ = self.writer.shutdown(std::net::Shutdown::Both);
        if let Some(data) = self.data {
            let _ = data.shutdown(std::net::Shutdown::Both);
        }
    }

    fn retr(&mut self, path: &str) -> Result<()> {
        self.send(&format!("RETR {path}"))?;
        match self.reply_code()? {
            150 => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    /// Negotiate passive mode and open the data socket, replacing any
    /// leftover one.
    fn open_data_channel(&mut self) -> Result<()> {
        self.send("PASV")?;
        match self.reply_code()? {
            227 => {}
            _ => return Err(self.unexpected()),
        }

        let (address, port) =
            parse_passive_reply(&self.last_reply).ok_or_else(|| self.unexpected())?;
        self.data = None;
        debug!(%address, port, "opening data channel");
        self.data = Some(TcpStream::connect((address.as_str(), port))?);
        Ok(())
    }

    fn take_data(&mut self) -> Result<TcpStream> {
        self.data.take().ok_or_else(|| RemoteError::Io(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "no data channel",
        )))
    }

    fn send(&mut self, command: &str) -> Result<()> {
        trace!(command, "sending");
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read one complete reply; continuation lines (dash after the code)
    /// are consumed until the closing line of the same code arrives.
    fn read_reply(&mut self) -> Result<String> {
        let mut line = self.read_line()?;
        if line.len() > 3 && line.as_bytes()[3] == b'-' {
            let code = line[..3].to_string();
            loop {
                line = self.read_line()?;
                if line.len() > 3 && line.starts_with(&code) && line.as_bytes()[3] == b' ' {
                    break;
                }
            }
        }
        trace!(reply = %line, "received");
        self.last_reply = line.clone();
        Ok(line)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line)?;
        if read == 0 {
            return Err(RemoteError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control channel closed",
            )));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn reply_code(&mut self) -> Result<u32> {
        let reply = self.read_reply()?;
        reply
            .get(..3)
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or(RemoteError::UnexpectedReply { reply })
    }

    fn unexpected(&self) -> RemoteError {
        RemoteError::UnexpectedReply {
            reply: self.last_reply.clone(),
        }
    }
}

fn join_remote(directory: &str, name: &str) -> String {
    if directory == "/" {
        format!("/{name}")
    } else {
        format!("{directory}/{name}")
    }
}

/// Extract the passive address from a 227 reply: six comma-separated
/// decimal fields between the first and last digit; the last two form the
/// port.
pub(crate) fn parse_passive_reply(reply: &str) -> Option<(String, u16)> {
    let bytes = reply.as_bytes();
    let first = bytes.iter().skip(4).position(|b| b.is_ascii_digit())? + 4;
    let last = bytes.iter().rposition(|b| b.is_ascii_digit())?;
    if last < first {
        return None;
    }

    let fields: Vec<&str> = reply[first..=last].split(',').collect();
    if fields.len() != 6 {
        return None;
    }
    let octets: Vec<u32> = fields
        .iter()
        .map(|f| f.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;

    let address = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
    let port = (octets[4] << 8) + octets[5];
    u16::try_from(port).ok().map(|port| (address, port))
}

/// Parse one listing line into an entry. Returns `Ok(None)` for lines that
/// do not split into exactly nine whitespace-delimited tokens; an unknown
/// type character is a protocol violation.
pub(crate) fn parse_listing_line(line: &str) -> Result<Option<RemoteEntry>> {
    let Some((tokens, name)) = split_nine(line) else {
        return Ok(None);
    };

    let kind = match line.chars().next() {
        Some('d') => RemoteEntryKind::Directory,
        Some('b') => RemoteEntryKind::Block,
        Some('c') => RemoteEntryKind::Character,
        Some('l') => RemoteEntryKind::SymbolicLink,
        Some('p') => RemoteEntryKind::Fifo,
        Some('s') => RemoteEntryKind::Socket,
        Some('-') => RemoteEntryKind::Regular,
        _ => {
            return Err(RemoteError::UnexpectedReply {
                reply: line.to_string(),
            })
        }
    };

    Ok(Some(RemoteEntry {
        kind,
        permissions: 0,
        links: tokens[1].parse().unwrap_or(0),
        owner: tokens[2].to_string(),
        group: tokens[3].to_string(),
        size: tokens[4].parse().unwrap_or(0),
        timestamp: format!("{} {} {}", tokens[5], tokens[6], tokens[7]),
        name: name.to_string(),
    }))
}

/// Split a listing line into its first eight tokens and the remainder (the
/// file name, which may itself contain spaces). Returns `None` when fewer
/// than nine tokens are present.
fn split_nine(line: &str) -> Option<([&str; 8], &str)> {
    let mut rest = line;
    let mut tokens = [""; 8];
    for token in tokens.iter_mut() {
        rest = rest.trim_start_matches(' ');
        let end = rest.find(' ')?;
        *token = &rest[..end];
        rest = &rest[end..];
    }
    let name = rest.trim_start_matches(' ');
    if name.is_empty() {
        return None;
    }
    Some((tokens, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passive_reply() {
        let reply = "227 Entering Passive Mode (10,0,0,2,5,57).";
        let (address, port) = parse_passive_reply(reply).unwrap();
        assert_eq!(address, "10.0.0.2");
        assert_eq!(port, (5 << 8) + 57);
    }

    #[test]
    fn test_parse_passive_reply_rejects_garbage() {
        assert!(parse_passive_reply("227 no address here").is_none());
        assert!(parse_passive_reply("227 (1,2,3,4,5)").is_none());
    }

    #[test]
    fn test_parse_listing_line_regular_file() {
        let entry = parse_listing_line("-rw-r--r-- 1 owner group 4096 Jan 1 00:00 file.pkg")
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, RemoteEntryKind::Regular);
        assert_eq!(entry.links, 1);
        assert_eq!(entry.owner, "owner");
        assert_eq!(entry.group, "group");
        assert_eq!(entry.size, 4096);
        assert_eq!(entry.timestamp, "Jan 1 00:00");
        assert_eq!(entry.name, "file.pkg");
    }

    #[test]
    fn test_parse_listing_line_directory_and_spaces_in_name() {
        let entry = parse_listing_line("drwxr-xr-x 2 root root 512 Feb 12 12:00 My Games")
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, RemoteEntryKind::Directory);
        assert_eq!(entry.name, "My Games");
    }

    #[test]
    fn test_parse_listing_line_skips_short_lines() {
        assert!(parse_listing_line("total 12").unwrap().is_none());
        assert!(parse_listing_line("").unwrap().is_none());
    }

    #[test]
    fn test_parse_listing_line_unparseable_numbers_fall_back_to_zero() {
        let entry = parse_listing_line("-rw-r--r-- ? owner group ? Jan 1 00:00 file.pkg")
            .unwrap()
            .unwrap();
        assert_eq!(entry.links, 0);
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn test_parse_listing_line_unknown_type_is_protocol_violation() {
        let result = parse_listing_line("Xrw-r--r-- 1 owner group 10 Jan 1 00:00 odd");
        assert!(matches!(result, Err(RemoteError::UnexpectedReply { .. })));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/", "user"), "/user");
        assert_eq!(join_remote("/user/app", "TEST00000"), "/user/app/TEST00000");
    }
}

//! End-to-end exercises of the FTP client against an in-process stub server.

use pakdex_remote::{Connect, FtpClient, RemoteEntryKind, RemoteError};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

/// What the stub serves for LIST and RETR.
#[derive(Clone)]
struct StubBehavior {
    greeting: Vec<&'static str>,
    listing: &'static str,
    file_bytes: Vec<u8>,
    /// Number of 450 replies before the LIST proceeds.
    busy_replies: usize,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            greeting: vec!["220 stub ready"],
            listing: "",
            file_bytes: Vec::new(),
            busy_replies: 0,
        }
    }
}

/// Single-connection FTP stub: accepts one control connection and serves
/// the scripted behavior until the client disconnects.
fn spawn_stub(behavior: StubBehavior) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = std::thread::spawn(move || {
        let (control, _) = listener.accept().unwrap();
        serve(control, behavior);
    });

    (port, handle)
}

fn serve(control: TcpStream, behavior: StubBehavior) {
    let mut writer = control.try_clone().unwrap();
    let mut reader = BufReader::new(control);
    let mut reply = |text: &str| {
        let _ = writer.write_all(format!("{text}\r\n").as_bytes());
        let _ = writer.flush();
    };

    for line in &behavior.greeting {
        reply(line);
    }

    let mut data_listener: Option<TcpListener> = None;
    let mut busy_remaining = behavior.busy_replies;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        let (command, _argument) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "USER" => reply("331 need password"),
            "PASS" => reply("230 logged in"),
            "ACCT" => reply("230 account accepted"),
            "TYPE" => reply("200 switched"),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").unwrap();
                let port = listener.local_addr().unwrap().port();
                reply(&format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).",
                    port >> 8,
                    port & 0xFF
                ));
                data_listener = Some(listener);
            }
            "LIST" => {
                // The client keeps reading replies for the same LIST while
                // the server reports 450.
                while busy_remaining > 0 {
                    busy_remaining -= 1;
                    reply("450 busy, try again");
                }
                reply("150 here it comes");
                if let Some(listener) = data_listener.take() {
                    let (mut data, _) = listener.accept().unwrap();
                    let _ = data.write_all(behavior.listing.as_bytes());
                }
                reply("226 done");
            }
            "RETR" => {
                reply("150 opening data connection");
                if let Some(listener) = data_listener.take() {
                    let (mut data, _) = listener.accept().unwrap();
                    let _ = data.write_all(&behavior.file_bytes);
                }
                reply("226 transfer complete");
            }
            _ => reply("502 not implemented"),
        }
    }
}

fn connect(port: u16) -> FtpClient {
    match FtpClient::connect("127.0.0.1", port).unwrap() {
        Connect::Ready(client) => client,
        Connect::TemporarilyUnavailable => panic!("stub reported unavailable"),
    }
}

#[test]
fn test_connect_login_and_type() {
    let (port, _server) = spawn_stub(StubBehavior::default());
    let mut client = connect(port);
    client.login_anonymous().unwrap();
    client.set_binary(true).unwrap();
    client.disconnect();
}

#[test]
fn test_delayed_greeting_is_consumed() {
    let (port, _server) = spawn_stub(StubBehavior {
        greeting: vec!["120 service in a moment", "220 stub ready"],
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();
    client.disconnect();
}

#[test]
fn test_unavailable_greeting() {
    let (port, _server) = spawn_stub(StubBehavior {
        greeting: vec!["421 service unavailable"],
        ..StubBehavior::default()
    });
    match FtpClient::connect("127.0.0.1", port).unwrap() {
        Connect::TemporarilyUnavailable => {}
        Connect::Ready(_) => panic!("expected temporarily unavailable"),
    }
}

#[test]
fn test_multiline_greeting() {
    let (port, _server) = spawn_stub(StubBehavior {
        greeting: vec!["220-welcome to the stub", "220-second line", "220 ready"],
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();
    client.disconnect();
}

#[test]
fn test_list_parses_entries_and_skips_malformed_lines() {
    let (port, _server) = spawn_stub(StubBehavior {
        listing: "total 2\r\n\
                  drwxr-xr-x 2 root root 512 Jan 1 00:00 TEST00000\r\n\
                  -rw-r--r-- 1 owner group 4096 Jan 1 00:00 file.pkg\r\n",
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();

    let entries = client.list("/user/app").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, RemoteEntryKind::Directory);
    assert_eq!(entries[0].name, "TEST00000");
    assert_eq!(entries[1].kind, RemoteEntryKind::Regular);
    assert_eq!(entries[1].size, 4096);
    client.disconnect();
}

#[test]
fn test_list_retries_after_busy_reply() {
    let (port, _server) = spawn_stub(StubBehavior {
        listing: "-rw-r--r-- 1 o g 10 Jan 1 00:00 late.pkg\r\n",
        busy_replies: 1,
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();

    // The stub answers 450 once; the client sleeps and reads the next reply.
    let entries = client.list("/slow").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "late.pkg");
    client.disconnect();
}

#[test]
fn test_list_directories_filters_by_pattern() {
    let (port, _server) = spawn_stub(StubBehavior {
        listing: "drwxr-xr-x 2 r r 512 Jan 1 00:00 TEST00000\r\n\
                  drwxr-xr-x 2 r r 512 Jan 1 00:00 notes\r\n\
                  drwxr-xr-x 2 r r 512 Jan 1 00:00 .\r\n\
                  drwxr-xr-x 2 r r 512 Jan 1 00:00 ..\r\n\
                  -rw-r--r-- 1 r r 100 Jan 1 00:00 CUSA11111\r\n",
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();

    let pattern = regex::Regex::new("^[A-Z]{4}[0-9]{5}$").unwrap();
    let directories = client.list_directories("/user/app", Some(&pattern)).unwrap();
    assert_eq!(directories, ["/user/app/TEST00000"]);
    client.disconnect();
}

#[test]
fn test_list_files_filters_by_extension() {
    let (port, _server) = spawn_stub(StubBehavior {
        listing: "-rw-r--r-- 1 r r 100 Jan 1 00:00 app.pkg\r\n\
                  -rw-r--r-- 1 r r 100 Jan 1 00:00 readme.txt\r\n\
                  drwxr-xr-x 2 r r 512 Jan 1 00:00 sub.pkg\r\n",
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();

    let files = client.list_files("/", ".pkg").unwrap();
    assert_eq!(files, ["/app.pkg"]);
    client.disconnect();
}

#[test]
fn test_download_prefix_stops_at_limit() {
    let (port, _server) = spawn_stub(StubBehavior {
        file_bytes: vec![7u8; 64 * 1024],
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();
    client.set_binary(true).unwrap();

    let bytes = client.download_prefix("/big.pkg", 4096).unwrap();
    assert_eq!(bytes.len(), 4096);
    assert!(bytes.iter().all(|&b| b == 7));

    // The control channel stays usable for the next command.
    let more = client.download_prefix("/big.pkg", 16).unwrap();
    assert_eq!(more.len(), 16);
    client.disconnect();
}

#[test]
fn test_download_to_sink() {
    let (port, _server) = spawn_stub(StubBehavior {
        file_bytes: b"archive payload".to_vec(),
        ..StubBehavior::default()
    });
    let mut client = connect(port);
    client.login_anonymous().unwrap();

    let mut sink = Vec::new();
    let copied = client.download_to("/file.pkg", &mut sink).unwrap();
    assert_eq!(copied, 15);
    assert_eq!(sink, b"archive payload");
    client.disconnect();
}

#[test]
fn test_unexpected_reply_carries_raw_text() {
    let (port, _server) = spawn_stub(StubBehavior {
        greeting: vec!["500 who are you"],
        ..StubBehavior::default()
    });
    match FtpClient::connect("127.0.0.1", port) {
        Err(RemoteError::UnexpectedReply { reply }) => {
            assert_eq!(reply, "500 who are you");
        }
        Err(other) => panic!("expected unexpected-reply error, got {other:?}"),
        Ok(_) => panic!("expected an error"),
    }
}

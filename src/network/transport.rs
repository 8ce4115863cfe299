use std::io::{BufRead, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::message::Message;

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivers one framed message to a peer over a fresh connection.
///
/// The connection carries exactly one newline-terminated JSON document and
/// is closed as soon as it has been flushed. Callers treat a failure as a
/// lost message: the protocol recovers through retries and quorum slack.
pub fn send_message(addr: &str, message: &Message) -> Result<()> {
    let stream = TcpStream::connect(addr).with_context(|| format!("connect to {addr}"))?;
    stream.set_write_timeout(Some(SEND_TIMEOUT))?;
    let mut writer = BufWriter::new(stream);
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one framed message.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<Message> {
    let mut line = String::new();
    reader.read_line(&mut line).context("read message frame")?;
    let message = serde_json::from_str(&line).context("decode message")?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::message::MessageType;

    #[test]
    fn message_survives_line_framing() {
        let message = Message::new(MessageType::Prepare, Some("M1".to_string()), 7, "M1");
        let frame = format!("{}\n", serde_json::to_string(&message).unwrap());

        let mut reader = Cursor::new(frame);
        let decoded = read_message(&mut reader).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn promise_with_empty_state_survives_framing() {
        let message = Message::new(MessageType::Promise, None, -1, "M4");
        let frame = format!("{}\n", serde_json::to_string(&message).unwrap());

        let mut reader = Cursor::new(frame);
        let decoded = read_message(&mut reader).unwrap();

        assert_eq!(decoded.value, None);
        assert_eq!(decoded.proposal_number, -1);
    }

    #[test]
    fn garbage_frame_fails_to_decode() {
        let mut reader = Cursor::new("this is not a message\n".to_string());

        assert!(read_message(&mut reader).is_err());
    }

    #[test]
    fn send_delivers_one_message_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let receiver = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            read_message(&mut reader).unwrap()
        });

        let message = Message::new(MessageType::Accepted, Some("M2".to_string()), 3, "M4");
        send_message(&addr, &message).unwrap();

        assert_eq!(receiver.join().unwrap(), message);
    }

    #[test]
    fn send_to_closed_port_reports_an_error() {
        // Bind then drop, so the port is known to refuse connections.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let message = Message::new(MessageType::Learn, Some("M1".to_string()), 1, "M1");
        assert!(send_message(&addr, &message).is_err());
    }
}

//! Server-sent event decoding for the JMAP push channel

use std::io::BufRead;

use crate::error::Result;
use crate::models::StateChange;

/// Event name carrying a `StateChange` payload
const STATE_EVENT: &str = "state";

/// Blocking iterator over `state` events of an event source stream
///
/// Comment lines, pings and events with other names are skipped. The
/// iterator ends when the underlying stream reaches EOF. A read failure or
/// an unparsable payload is yielded as an error.
pub struct EventStream<R> {
    reader: R,
    event: String,
    data: String,
    line: String,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            event: String::new(),
            data: String::new(),
            line: String::new(),
        }
    }

    /// Take the buffered event if it is a `state` event with data
    fn dispatch(&mut self) -> Option<String> {
        let event = std::mem::take(&mut self.event);
        let data = std::mem::take(&mut self.data);
        // An unnamed event defaults to "message"
        (event == STATE_EVENT && !data.is_empty()).then_some(data)
    }

    fn field(&mut self, line: &str) {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.event = value.to_string(),
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
            }
            _ => {}
        }
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<StateChange>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }

            let line = self.line.trim_end_matches(['\r', '\n']).to_string();
            if line.is_empty() {
                if let Some(data) = self.dispatch() {
                    return Some(serde_json::from_str(&data).map_err(Into::into));
                }
            } else if !line.starts_with(':') {
                self.field(&line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EMAIL_TYPE, StateToken};
    use std::io::Cursor;

    fn stream(body: &str) -> EventStream<Cursor<Vec<u8>>> {
        EventStream::new(Cursor::new(body.as_bytes().to_vec()))
    }

    #[test]
    fn test_decodes_state_events() {
        let body = concat!(
            ": keep-alive\n",
            "event: ping\n",
            "data: {\"interval\": 60}\n",
            "\n",
            "event: state\n",
            "data: {\"@type\":\"StateChange\",\"changed\":{\"u1138\":{\"Email\":\"2187\"}}}\n",
            "\n",
            "event: state\r\n",
            "data: {\"@type\":\"StateChange\",\r\n",
            "data: \"changed\":{\"u1138\":{\"Email\":\"2188\"}}}\r\n",
            "\r\n",
        );

        let changes: Vec<StateChange> = stream(body).map(Result::unwrap).collect();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].changed["u1138"][EMAIL_TYPE], StateToken::new("2187"));
        assert_eq!(changes[1].changed["u1138"][EMAIL_TYPE], StateToken::new("2188"));
    }

    #[test]
    fn test_unterminated_event_is_dropped() {
        let body = "event: state\ndata: {\"changed\":{}}\n";
        assert_eq!(stream(body).count(), 0);
    }

    #[test]
    fn test_bad_payload_is_an_error() {
        let body = "event: state\ndata: not json\n\n";
        let mut events = stream(body);
        assert!(events.next().unwrap().is_err());
        assert!(events.next().is_none());
    }

    #[test]
    fn test_unnamed_events_skipped() {
        let body = "data: {\"changed\":{}}\n\n";
        assert_eq!(stream(body).count(), 0);
    }
}

//! Log lines the server writes and the exporter counts.

/// Written by the authentication layer on a successful sign-in.
pub const LOGIN_SUCCEEDED: &str = "login succeeded";
pub const UPLOAD_STARTED: &str = "upload started";
pub const ANIMAL_IDENTIFIED: &str = "animal identified";
/// Level token `tracing-subscriber` prints for error events.
pub const ERROR_LEVEL: &str = "ERROR";

/// What a single log line counts as. Markers are checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    UserConnected,
    UploadStarted,
    AnimalIdentified,
    Error,
}

pub fn classify_line(line: &str) -> Option<LogEvent> {
    if line.contains(LOGIN_SUCCEEDED) {
        Some(LogEvent::UserConnected)
    } else if line.contains(UPLOAD_STARTED) {
        Some(LogEvent::UploadStarted)
    } else if line.contains(ANIMAL_IDENTIFIED) {
        Some(LogEvent::AnimalIdentified)
    } else if line.split_whitespace().any(|token| token == ERROR_LEVEL || token == "ERROR:") {
        Some(LogEvent::Error)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_formatted_lines() {
        assert_eq!(
            classify_line("2026-01-01T10:00:00Z  INFO wildaware::server: upload started"),
            Some(LogEvent::UploadStarted)
        );
        assert_eq!(
            classify_line("2026-01-01T10:00:00Z  INFO wildaware::server: animal identified animal=Loup"),
            Some(LogEvent::AnimalIdentified)
        );
        assert_eq!(
            classify_line("2026-01-01T10:00:00Z ERROR wildaware::server: upload to bucket failed"),
            Some(LogEvent::Error)
        );
        assert_eq!(classify_line("2026-01-01T10:00:00Z  INFO ERRORS are fine"), None);
        assert_eq!(classify_line(""), None);
    }
}

//! Line protocol spoken to the remote client.
//!
//! Inbound bytes are single-character commands or `r:<digits>` tokens and are
//! handled by the core command parser. Outbound traffic is one telemetry line
//! per interval carrying the smoothed speed.

pub const TELEMETRY_PREFIX: &str = "RPM:";

/// `RPM:<n>\n`
pub fn encode_telemetry(rpm: u32) -> Vec<u8> {
    format!("{TELEMETRY_PREFIX}{rpm}\n").into_bytes()
}

/// Reads the speed back out of a telemetry line, with or without its newline.
pub fn parse_telemetry(line: &str) -> Option<u32> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(TELEMETRY_PREFIX)?
        .parse()
        .ok()
}

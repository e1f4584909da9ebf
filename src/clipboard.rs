use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// OSC 52 escape sequence asking the terminal to put `text` on the system
/// clipboard. Terminals without OSC 52 support ignore it.
pub fn osc52(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_payload() {
        assert_eq!(osc52("ABC123"), "\x1b]52;c;QUJDMTIz\x07");
    }
}

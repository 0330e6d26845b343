//! Message-of-the-day banner, rendered once per newly-created session.
//!
//! A pure function from connection facts to bytes: art selection, CRLF conversion for raw PTY
//! delivery, and the connection-info lines.

const BRIGHT_WHITE: &str = "\x1b[97m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

const BUILTIN_ART: &str = "\
  .  .\n\
  |\\/|  relay\n\
  |  |\n";

/// Resolve the configured `motd_art` setting into raw art bytes: `\"none\"` yields empty,
/// `\"builtin\"` yields the built-in art, anything else is treated as a path to a custom file
/// (falling back to the built-in art if the file can't be read).
fn load_art(motd_art: &str) -> String {
    match motd_art {
        "none" => String::new(),
        "builtin" => BUILTIN_ART.to_string(),
        path => std::fs::read_to_string(path).unwrap_or_else(|_| BUILTIN_ART.to_string()),
    }
}

/// Render the MOTD banner sent as the first binary frame of a newly-created session.
pub fn render_motd(host: &str, port: u16, secure: bool, remote_addr: Option<&str>, motd_art: &str) -> Vec<u8> {
    if motd_art == "none" {
        return Vec::new();
    }

    let mut art = load_art(motd_art);
    if !art.is_empty() {
        art = art.replace("\r\n", "\n").replace('\n', "\r\n");
    }

    let proto = if secure { "https" } else { "http" };
    let color = if secure { GREEN } else { RED };
    let mode = if secure { "secure" } else { "UNSECURE" };

    let mut lines = Vec::new();
    if !art.is_empty() {
        lines.push(art);
    }
    lines.push(format!(
        "  {BRIGHT_WHITE}Listening on:{RESET}  {color}{proto}://{host}:{port}{RESET}"
    ));
    if let Some(addr) = remote_addr {
        lines.push(format!(
            "  {BRIGHT_WHITE}Connected from:{RESET} {color}{addr}{RESET}"
        ));
    }
    lines.push(format!("  {BRIGHT_WHITE}Mode:{RESET}           {color}{mode}{RESET}"));
    lines.push(String::new());

    if !secure {
        lines.push(format!("  {RED}/!\\ This session is UNSECURE.{RESET}"));
        lines.push(String::new());
    }
    lines.push(String::new());

    lines.join("\r\n").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_art_yields_empty_banner() {
        assert!(render_motd("127.0.0.1", 57575, true, None, "none").is_empty());
    }

    #[test]
    fn builtin_art_mentions_listening_address() {
        let motd = render_motd("127.0.0.1", 57575, true, None, "builtin");
        let text = String::from_utf8(motd).unwrap();
        assert!(text.contains("127.0.0.1:57575"));
        assert!(text.contains("secure"));
    }

    #[test]
    fn unsecure_banner_contains_warning() {
        let motd = render_motd("0.0.0.0", 8080, false, None, "builtin");
        let text = String::from_utf8(motd).unwrap();
        assert!(text.contains("UNSECURE"));
    }

    #[test]
    fn remote_addr_is_included_when_present() {
        let motd = render_motd("127.0.0.1", 57575, true, Some("10.0.0.5:443"), "builtin");
        let text = String::from_utf8(motd).unwrap();
        assert!(text.contains("10.0.0.5:443"));
    }

    #[test]
    fn missing_custom_art_file_falls_back_to_builtin() {
        let motd = render_motd("127.0.0.1", 57575, true, None, "/no/such/file/exists");
        let text = String::from_utf8(motd).unwrap();
        assert!(text.contains("relay"));
    }
}

#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell escaping, script building, process execution, file helpers.

pub mod exec;
pub mod fs;
pub mod shell_script;

pub use shell_script::ShellScript;

/// Reject strings containing newline, carriage return, or NUL before embedding into a shell command.
pub fn reject_newlines(s: &str, what: &str) -> Result<(), String> {
    if s.contains('\n') || s.contains('\r') || s.contains('\0') {
        Err(format!("refusing to use {what}: contains newline"))
    } else {
        Ok(())
    }
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape_simple() {
        assert_eq!(shell_escape("abc-123_./:@"), "abc-123_./:@");
    }

    #[test]
    fn test_shell_escape_with_spaces_and_quotes() {
        assert_eq!(shell_escape("a b c"), "'a b c'");
        assert_eq!(shell_escape("O'Reilly"), "'O'\"'\"'Reilly'");
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn test_shell_join() {
        let args = vec!["ssh".to_string(), "-p".to_string(), "a b".to_string()];
        assert_eq!(shell_join(&args), "ssh -p 'a b'");
    }

    #[test]
    fn test_reject_newlines() {
        assert!(reject_newlines("ssh-ed25519 AAAA", "key").is_ok());
        let e = reject_newlines("a\nb", "key").unwrap_err();
        assert!(e.contains("contains newline"));
    }
}

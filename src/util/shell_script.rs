use std::io;

/// Builder for shell scripts that are executed via `sh -c` inside the container.
///
/// Invariants:
/// - Commands must not contain `\n` or `\r`.
/// - Commands are joined with `; ` unless pushed with `and_then`, which joins with ` && `.
#[derive(Debug, Default)]
pub struct ShellScript {
    parts: Vec<(String, bool)>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn push(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.parts.push((cmd.into(), false));
        self
    }

    /// Append a command that only runs when the previous one succeeded.
    pub fn and_then(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.parts.push((cmd.into(), true));
        self
    }

    pub fn build(&self) -> io::Result<String> {
        let mut out = String::new();
        for (i, (p, chained)) in self.parts.iter().enumerate() {
            if p.contains('\n') || p.contains('\r') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("shell script fragment {i} contains a newline; use atomic fragments"),
                ));
            }
            if i > 0 {
                out.push_str(if *chained { " && " } else { "; " });
            }
            out.push_str(p);
        }
        Ok(out)
    }
}

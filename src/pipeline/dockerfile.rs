//! Build file synthesis: fixed template plus post-create steps.

/// First line of every build file this tool writes; its absence means a user owns the file.
pub const OWNERSHIP_MARKER: &str =
    "# codium-devcontainer: generated build file, removed after each build";

/// Everything after this line is regenerated on every render.
pub const POST_CREATE_MARKER: &str = "# codium-devcontainer: post-create steps";

pub const TEMPLATE: &str = include_str!("../../assets/Dockerfile.template");

/// Concatenate `template` with one `RUN` per step.
///
/// Rendering an already-rendered file again yields the same output, so repeated builds
/// never duplicate steps.
pub fn render(template: &str, steps: &[String]) -> String {
    let body = match template.find(POST_CREATE_MARKER) {
        Some(i) => &template[..i],
        None => template,
    };
    let mut out = String::with_capacity(body.len() + 64 * (steps.len() + 1));
    if !body.starts_with(OWNERSHIP_MARKER) {
        out.push_str(OWNERSHIP_MARKER);
        out.push('\n');
    }
    out.push_str(body.trim_end());
    out.push('\n');
    let steps: Vec<&String> = steps.iter().filter(|s| !s.trim().is_empty()).collect();
    if !steps.is_empty() {
        out.push('\n');
        out.push_str(POST_CREATE_MARKER);
        out.push('\n');
        for step in steps {
            // Exec form with a JSON string keeps quotes and newlines intact.
            let quoted = serde_json::Value::String(step.clone()).to_string();
            out.push_str(&format!("RUN [\"/bin/sh\", \"-c\", {quoted}]\n"));
        }
    }
    out
}

/// True when the build file content was written by this tool.
pub fn is_owned(content: &str) -> bool {
    content
        .lines()
        .next()
        .map(|l| l.trim_end() == OWNERSHIP_MARKER)
        .unwrap_or(false)
}

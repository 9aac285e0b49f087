use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::RenderError;
use crate::merge::is_informative;
use crate::Architecture;

/// Shown instead of an empty graph so the renderer always gets valid input.
pub const PLACEHOLDER_LABEL: &str = "No architecture yet";

/// Turns diagram source into something displayable.
pub trait Renderer {
    type Artifact;

    fn render(&self, source: &str) -> Result<Self::Artifact, RenderError>;
}

/// Wraps Mermaid source in a Markdown code fence, which most Markdown viewers
/// render as a diagram.
#[derive(Clone, Copy, Debug, Default)]
pub struct MermaidMarkdown;

impl Renderer for MermaidMarkdown {
    type Artifact = String;

    fn render(&self, source: &str) -> Result<Self::Artifact, RenderError> {
        check_flowchart(source)?;
        let mut out = String::with_capacity(source.len() + 32);
        out.push_str("```mermaid\n");
        out.push_str(source);
        if !source.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
        Ok(out)
    }
}

/// Flowchart header plus a source that cannot close the surrounding fence.
fn check_flowchart(source: &str) -> Result<(), RenderError> {
    let Some(header) = source.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Err(RenderError::Empty);
    };
    let keyword = header
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or_default();
    if !matches!(keyword, "graph" | "flowchart") {
        return Err(RenderError::UnknownHeader(header.to_string()));
    }
    if source.contains("```") {
        return Err(RenderError::EmbeddedFence);
    }
    Ok(())
}

/// Render an architecture as a Mermaid flowchart.
///
/// Node identifiers are positional (`n0`, `n1`, ...) so arbitrary component ids
/// can never break the syntax. Flows whose endpoints do not name a component
/// are left out.
pub fn project(arch: &Architecture) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "graph TD;");

    let mut nodes: HashMap<&str, usize> = HashMap::new();
    for component in &arch.components {
        let id = component.id.as_str();
        if id.is_empty() || nodes.contains_key(id) {
            continue;
        }
        let n = nodes.len();
        nodes.insert(id, n);
        let label = if component.name.trim().is_empty() {
            id
        } else {
            component.name.as_str()
        };
        let _ = write!(out, "  n{n}(\"");
        write_escaped_label(&mut out, label);
        let _ = writeln!(out, "\");");
    }

    if nodes.is_empty() {
        out.clear();
        let _ = writeln!(out, "graph TD;");
        let _ = write!(out, "  empty[\"");
        write_escaped_label(&mut out, PLACEHOLDER_LABEL);
        let _ = writeln!(out, "\"];");
        return out;
    }

    for flow in &arch.data_flows {
        let (Some(from), Some(to)) = (nodes.get(flow.from.as_str()), nodes.get(flow.to.as_str()))
        else {
            continue;
        };
        let label = [flow.flow_type.as_deref(), flow.description.as_deref()]
            .into_iter()
            .flatten()
            .find(|l| is_informative(l));
        match label {
            Some(label) => {
                let _ = write!(out, "  n{from} -->|\"");
                write_escaped_label(&mut out, label);
                let _ = writeln!(out, "\"| n{to};");
            }
            None => {
                let _ = writeln!(out, "  n{from} --> n{to};");
            }
        }
    }

    out
}

fn write_escaped_label(out: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("#quot;"),
            '`' => out.push_str("#96;"),
            '\n' | '\r' | '\t' => out.push(' '),
            _ => out.push(ch),
        }
    }
}

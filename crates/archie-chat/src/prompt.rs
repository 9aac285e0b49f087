use archie_core::rules::{EXAMPLE_REPLY, RULES};
use archie_core::{Architecture, TaskDescriptor};

fn name_of<'a>(id: &'a str, arch: &'a Architecture) -> &'a str {
    arch.component(id).map(|c| c.name.as_str()).unwrap_or(id)
}

/// Compact text rendering of the architecture for LLM consumption.
pub fn serialize_architecture(arch: &Architecture) -> String {
    if arch.is_empty() {
        return "(empty: nothing has been designed yet)\n".to_string();
    }

    let mut out = String::with_capacity(1024);

    out.push_str("COMPONENTS:\n");
    for c in &arch.components {
        out.push('[');
        out.push_str(&c.id);
        out.push_str("] \"");
        out.push_str(&c.name);
        out.push('"');
        if let Some(tech) = c.tech.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(" tech=");
            out.push_str(tech);
        }
        if let Some(desc) = c.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(" | \"");
            // Truncate long descriptions
            if desc.chars().count() > 80 {
                out.extend(desc.chars().take(80));
                out.push_str("...");
            } else {
                out.push_str(desc);
            }
            out.push('"');
        }
        out.push('\n');
    }

    out.push_str("DATA FLOWS:\n");
    for flow in &arch.data_flows {
        out.push_str(&flow.from);
        out.push_str(" \"");
        out.push_str(name_of(&flow.from, arch));
        out.push_str("\" --[");
        out.push_str(flow.flow_type.as_deref().unwrap_or("uses"));
        if let Some(desc) = &flow.description {
            out.push('/');
            out.push_str(desc);
        }
        out.push_str("]--> ");
        out.push_str(&flow.to);
        out.push_str(" \"");
        out.push_str(name_of(&flow.to, arch));
        out.push('"');
        out.push('\n');
    }

    out
}

/// JSON schema of the payload, generated from the model types.
pub fn payload_schema() -> String {
    let schema = schemars::schema_for!(Architecture);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn stage_script(task: &TaskDescriptor) -> String {
    let mut out = String::new();
    out.push_str("## Design task: ");
    out.push_str(&task.title);
    out.push('\n');
    if !task.description.is_empty() {
        out.push_str(&task.description);
        out.push('\n');
    }
    out.push_str(
        "Walk the user through these stages in order. Do not skip ahead; move to the next \
stage only when the current one is settled, and tell the user which stage you are on.\n",
    );
    for (i, stage) in task.stages.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, stage));
    }
    out
}

/// Full system instructions for one request cycle.
pub fn system_instructions(task: &TaskDescriptor, arch: &Architecture) -> String {
    let mut out = format!(
        "You are Archie, a software architect and mentor. Guide the user through designing \
the architecture of their application: ask clarifying questions, propose components and \
technologies, and explain trade-offs briefly.\n\n\
## Payload rules (mandatory)\n{RULES}\n\n\
## Payload JSON schema\n{}\n\n\
## Example reply\n{EXAMPLE_REPLY}\n",
        payload_schema()
    );

    if task.is_guided() {
        out.push('\n');
        out.push_str(&stage_script(task));
    }

    out.push_str("\n## Current architecture\n");
    out.push_str(&serialize_architecture(arch));
    out
}

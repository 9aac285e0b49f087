use std::collections::HashMap;

use crate::{Architecture, Component, DataFlow};

/// Values the assistant uses when it has "forgotten" a fact. Compared trimmed
/// and case-insensitively.
pub const UNKNOWN_SENTINELS: &[&str] = &["unknown", "n/a", "na", "tbd", "none", "null", "?", "-"];

/// True when a value carries real information.
pub fn is_informative(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && !UNKNOWN_SENTINELS.iter().any(|s| v.eq_ignore_ascii_case(s))
}

fn informative(value: Option<&str>) -> bool {
    value.is_some_and(is_informative)
}

/// Fold an incoming payload into the current architecture.
///
/// The payload is expected to be the complete picture, but is reconciled
/// against `current` anyway: known components are never dropped, informative
/// fields are never overwritten by blanks or "unknown", duplicate ids collapse
/// with the last occurrence winning, and data flows are unioned without exact
/// duplicates. `None` leaves `current` untouched.
pub fn merge(current: &Architecture, incoming: Option<Architecture>) -> Architecture {
    let Some(incoming) = incoming else {
        return current.clone();
    };

    let mut components: Vec<Component> = Vec::with_capacity(
        current.components.len().max(incoming.components.len()),
    );
    let mut index: HashMap<String, usize> = HashMap::new();

    for component in current.components.iter().cloned().chain(incoming.components) {
        let id = component.id.trim().to_string();
        if id.is_empty() {
            tracing::debug!(name = %component.name, "dropping component without id");
            continue;
        }
        let component = Component { id: id.clone(), ..component };
        match index.get(&id).copied() {
            Some(pos) => {
                let existing = &mut components[pos];
                *existing = reconcile(existing, component);
            }
            None => {
                index.insert(id, components.len());
                components.push(component);
            }
        }
    }

    let mut data_flows: Vec<DataFlow> = Vec::with_capacity(current.data_flows.len());
    for flow in current.data_flows.iter().cloned().chain(incoming.data_flows) {
        let flow = normalize_flow(flow);
        if !data_flows.contains(&flow) {
            data_flows.push(flow);
        }
    }

    tracing::debug!(
        components = components.len(),
        data_flows = data_flows.len(),
        "merged architecture payload"
    );

    Architecture {
        components,
        data_flows,
    }
}

/// Newer facts win unless they are blank or a sentinel.
fn reconcile(existing: &Component, newer: Component) -> Component {
    Component {
        id: newer.id,
        name: if is_informative(&newer.name) || !is_informative(&existing.name) {
            newer.name
        } else {
            existing.name.clone()
        },
        tech: pick(existing.tech.as_deref(), newer.tech),
        description: pick(existing.description.as_deref(), newer.description),
    }
}

fn pick(existing: Option<&str>, newer: Option<String>) -> Option<String> {
    if informative(newer.as_deref()) || !informative(existing) {
        newer
    } else {
        existing.map(str::to_string)
    }
}

/// Trimmed endpoints; blank optional fields count as absent so that
/// `"type": ""` and a missing type deduplicate together.
fn normalize_flow(flow: DataFlow) -> DataFlow {
    fn non_blank(v: Option<String>) -> Option<String> {
        v.filter(|s| !s.trim().is_empty())
    }
    DataFlow {
        from: flow.from.trim().to_string(),
        to: flow.to.trim().to_string(),
        description: non_blank(flow.description),
        flow_type: non_blank(flow.flow_type),
    }
}

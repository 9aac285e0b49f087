use crate::Architecture;

/// Marker pair the assistant is instructed to wrap its architecture payload in.
pub const OPEN_MARKER: &str = "<JSON>";
pub const CLOSE_MARKER: &str = "</JSON>";

/// Assistant text split into what the user sees and the embedded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub display_text: String,
    pub payload: Option<Architecture>,
}

impl ParsedResponse {
    fn unchanged(raw: &str) -> Self {
        Self {
            display_text: raw.to_string(),
            payload: None,
        }
    }
}

/// Split raw assistant output into display text and an optional payload.
///
/// Only the first marker region counts. When that region does not decode as an
/// architecture object the whole response, markers included, is handed back as
/// display text so the broken payload stays visible.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let Some(region) = find_payload_region(raw) else {
        return ParsedResponse::unchanged(raw);
    };

    match decode_payload(region.body) {
        Ok(payload) => {
            let mut display = String::with_capacity(raw.len());
            display.push_str(&raw[..region.start]);
            display.push_str(&raw[region.end..]);
            ParsedResponse {
                display_text: display.trim().to_string(),
                payload: Some(payload),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "assistant payload did not decode, showing raw response");
            ParsedResponse::unchanged(raw)
        }
    }
}

struct PayloadRegion<'a> {
    /// Byte offset of the open marker.
    start: usize,
    /// Byte offset just past the close marker.
    end: usize,
    body: &'a str,
}

/// First open marker, then the first close marker after it.
fn find_payload_region(raw: &str) -> Option<PayloadRegion<'_>> {
    let start = raw.find(OPEN_MARKER)?;
    let body_start = start + OPEN_MARKER.len();
    let close = body_start + raw[body_start..].find(CLOSE_MARKER)?;
    Some(PayloadRegion {
        start,
        end: close + CLOSE_MARKER.len(),
        body: &raw[body_start..close],
    })
}

#[derive(Debug)]
enum DecodeError {
    Json(serde_json::Error),
    NotAnObject,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "{e}"),
            DecodeError::NotAnObject => write!(f, "payload is not a JSON object"),
        }
    }
}

fn decode_payload(body: &str) -> Result<Architecture, DecodeError> {
    let json = strip_code_fence(body.trim());
    let value: serde_json::Value = serde_json::from_str(json).map_err(DecodeError::Json)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    serde_json::from_value(value).map_err(DecodeError::Json)
}

/// Models sometimes wrap the JSON in a Markdown fence even inside the markers.
fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Component, DataFlow};
    use proptest::prelude::*;

    #[test]
    fn plain_text_passes_through() {
        let raw = "  Which database do you prefer?\n";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, raw);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn extracts_payload_and_trims_display_text() {
        let raw = "Adding X.\n<JSON>{\"components\":[{\"id\":\"a\",\"name\":\"A\",\"tech\":\"Go\"}],\"data_flows\":[]}</JSON>";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, "Adding X.");
        let payload = parsed.payload.unwrap();
        assert_eq!(
            payload.components,
            vec![Component {
                id: "a".into(),
                name: "A".into(),
                tech: Some("Go".into()),
                description: None,
            }]
        );
        assert!(payload.data_flows.is_empty());
    }

    #[test]
    fn text_around_the_payload_is_kept() {
        let raw = "Before.\n\n<JSON>\n{\"components\":[],\"data_flows\":[]}\n</JSON>\n\nAfter?";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, "Before.\n\n\n\nAfter?");
        assert_eq!(parsed.payload, Some(Architecture::default()));
    }

    #[test]
    fn invalid_json_is_shown_verbatim() {
        let raw = "Here you go <JSON>{\"components\": [</JSON> done";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, raw);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn wrong_shape_is_shown_verbatim() {
        for raw in [
            "<JSON>[]</JSON>",
            "<JSON>null</JSON>",
            "<JSON>{\"components\": \"frontend\"}</JSON>",
            "<JSON>{\"components\": [{\"id\": 7}]}</JSON>",
            "<JSON></JSON>",
        ] {
            let parsed = parse_response(raw);
            assert_eq!(parsed.display_text, raw);
            assert!(parsed.payload.is_none(), "{raw}");
        }
    }

    #[test]
    fn unclosed_marker_is_plain_text() {
        let raw = "Let me think <JSON>{\"components\":[]}";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, raw);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn only_first_region_is_honored() {
        let raw = "One <JSON>{\"components\":[{\"id\":\"a\",\"name\":\"A\"}]}</JSON> two <JSON>{\"components\":[{\"id\":\"b\",\"name\":\"B\"}]}</JSON>";
        let parsed = parse_response(raw);
        let payload = parsed.payload.unwrap();
        assert_eq!(payload.components.len(), 1);
        assert_eq!(payload.components[0].id, "a");
        assert!(parsed.display_text.starts_with("One  two <JSON>"));
    }

    #[test]
    fn fenced_json_inside_markers_decodes() {
        let raw = "Ok.\n<JSON>\n```json\n{\"components\":[{\"id\":\"q\",\"name\":\"Queue\"}],\"data_flows\":[]}\n```\n</JSON>";
        let parsed = parse_response(raw);
        assert_eq!(parsed.display_text, "Ok.");
        assert_eq!(parsed.payload.unwrap().components[0].name, "Queue");
    }

    #[test]
    fn missing_arrays_default_to_empty() {
        let parsed = parse_response("<JSON>{\"components\":[{\"id\":\"a\",\"name\":\"A\"}]}</JSON>");
        let payload = parsed.payload.unwrap();
        assert!(payload.data_flows.is_empty());
        assert_eq!(parsed.display_text, "");
    }

    fn arb_architecture() -> impl Strategy<Value = Architecture> {
        (
            prop::collection::vec(
                ("[a-z]{1,4}", "[A-Za-z ]{0,6}", proptest::option::of("[A-Za-z]{1,5}")),
                0..4,
            ),
            prop::collection::vec(
                ("[a-z]{1,4}", "[a-z]{1,4}", proptest::option::of("[A-Z]{2,4}")),
                0..4,
            ),
        )
            .prop_map(|(cs, fs)| Architecture {
                components: cs
                    .into_iter()
                    .map(|(id, name, tech)| Component {
                        id,
                        name,
                        tech,
                        description: None,
                    })
                    .collect(),
                data_flows: fs
                    .into_iter()
                    .map(|(from, to, flow_type)| DataFlow {
                        from,
                        to,
                        flow_type,
                        description: None,
                    })
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn text_without_markers_is_untouched(raw in "[^<]{0,40}") {
            let parsed = parse_response(&raw);
            prop_assert_eq!(parsed.display_text, raw);
            prop_assert!(parsed.payload.is_none());
        }

        #[test]
        fn valid_payload_is_extracted_and_stripped(
            before in "[^<]{0,20}",
            after in "[^<]{0,20}",
            arch in arb_architecture(),
        ) {
            let json = serde_json::to_string(&arch).unwrap();
            let raw = format!("{before}{OPEN_MARKER}{json}{CLOSE_MARKER}{after}");
            let parsed = parse_response(&raw);
            prop_assert_eq!(parsed.payload, Some(arch));
            let expected = format!("{before}{after}");
            prop_assert_eq!(parsed.display_text, expected.trim());
        }

        #[test]
        fn undecodable_payload_leaves_text_verbatim(
            before in "[^<]{0,20}",
            body in "[a-z{\\[,:]{1,12}",
        ) {
            let raw = format!("{before}{OPEN_MARKER}{body}{CLOSE_MARKER}");
            let parsed = parse_response(&raw);
            prop_assert_eq!(parsed.display_text, raw);
            prop_assert!(parsed.payload.is_none());
        }
    }
}

/// Payload protocol rules embedded in the assistant's system prompt.
pub const RULES: &str = "\
1. Every time you mention a new component, a technology choice or a connection between \
components, end your reply with an architecture payload. This includes the very first component.\n\
2. Wrap the payload in <JSON> and </JSON> tags. Exactly one payload per reply, always at the end.\n\
3. The payload is ALWAYS the complete, current architecture (every component and data flow \
agreed so far), never only the changes. Omitting a component does not delete it.\n\
4. Component ids are short, stable, lowercase identifiers (e.g. \"frontend\", \"orders_db\"). \
Never rename an id once introduced; change \"name\", \"tech\" or \"description\" instead.\n\
5. When a new component talks to an existing one, add an entry to \"data_flows\" in the same reply.\n\
6. \"from\" and \"to\" in \"data_flows\" must be ids from \"components\". The arrow points from \
the initiator to the provider.\n\
7. Keep facts you already stated. Do not blank out or set \"unknown\" for a technology or \
description that was decided earlier.\n\
8. If nothing about the architecture changed, reply without a payload.";

/// A reply that follows the rules, shown to the assistant as a worked example.
pub const EXAMPLE_REPLY: &str = "\
Great! We start with the Frontend: a web client for end users. What should we add next?\n\
\n\
<JSON>\n\
{\n\
  \"components\": [\n\
    {\n\
      \"id\": \"frontend\",\n\
      \"name\": \"Frontend\",\n\
      \"tech\": \"React\",\n\
      \"description\": \"Web client for end users.\"\n\
    }\n\
  ],\n\
  \"data_flows\": []\n\
}\n\
</JSON>";

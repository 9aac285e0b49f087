use serde::{Deserialize, Serialize};

/// Id of the free-form task with no stage script.
pub const BLANK_TASK_ID: &str = "blank";

/// A design exercise the user can pick to start a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Sent as the first (synthetic) user turn.
    pub opening_prompt: String,
    /// Ordered design stages the assistant walks the user through.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
}

impl TaskDescriptor {
    pub fn is_guided(&self) -> bool {
        !self.stages.is_empty()
    }
}

pub fn blank() -> TaskDescriptor {
    TaskDescriptor {
        id: BLANK_TASK_ID.to_string(),
        title: "Blank project".to_string(),
        description: "Design any system you have in mind, from scratch.".to_string(),
        opening_prompt: "Hi! I want to design a system of my own. Ask me what it should do \
and help me build its architecture step by step."
            .to_string(),
        stages: vec![],
    }
}

/// All built-in tasks, blank project last.
pub fn catalog() -> Vec<TaskDescriptor> {
    vec![
        TaskDescriptor {
            id: "url-shortener".to_string(),
            title: "URL shortener".to_string(),
            description: "A public service that turns long links into short ones and \
counts clicks."
                .to_string(),
            opening_prompt: "Let's design a URL shortener: users submit a long URL, get a \
short code back, and every visit to the short link redirects and is counted."
                .to_string(),
            stages: vec![
                "Clarify functional requirements and expected traffic.".to_string(),
                "Define the client and the public API that creates and resolves links.".to_string(),
                "Choose storage for link mappings and justify the technology.".to_string(),
                "Add caching for hot links on the redirect path.".to_string(),
                "Add click analytics without slowing down redirects.".to_string(),
            ],
        },
        TaskDescriptor {
            id: "chat-app".to_string(),
            title: "Team chat".to_string(),
            description: "Real-time messaging with channels, history and notifications."
                .to_string(),
            opening_prompt: "Let's design a team chat application with channels, real-time \
delivery, message history and push notifications."
                .to_string(),
            stages: vec![
                "Clarify users, channels and delivery guarantees.".to_string(),
                "Design the clients and the connection gateway for real-time delivery.".to_string(),
                "Choose message storage and how history is fetched.".to_string(),
                "Add fan-out between gateway instances.".to_string(),
                "Add push notifications for offline users.".to_string(),
            ],
        },
        TaskDescriptor {
            id: "online-store".to_string(),
            title: "Online store".to_string(),
            description: "A shop with a catalog, cart, checkout and order processing."
                .to_string(),
            opening_prompt: "Let's design an online store: product catalog, shopping cart, \
checkout with an external payment provider, and order fulfilment."
                .to_string(),
            stages: vec![
                "Clarify the customer journey and admin needs.".to_string(),
                "Design the storefront and catalog service.".to_string(),
                "Design cart and checkout, including the payment provider.".to_string(),
                "Design order processing and how services communicate.".to_string(),
                "Add search and observability.".to_string(),
            ],
        },
        blank(),
    ]
}

pub fn find(id: &str) -> Option<TaskDescriptor> {
    catalog().into_iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique_and_findable() {
        let tasks = catalog();
        let ids: HashSet<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), tasks.len());
        for task in &tasks {
            assert_eq!(find(&task.id).as_ref(), Some(task));
            assert!(!task.opening_prompt.is_empty());
        }
        assert!(find("nope").is_none());
    }

    #[test]
    fn only_blank_is_unguided() {
        for task in catalog() {
            assert_eq!(task.is_guided(), task.id != BLANK_TASK_ID, "{}", task.id);
        }
    }
}

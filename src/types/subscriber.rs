use serde::{Deserialize, Serialize};

pub type SubscriberId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Classic,
    Dynamic,
    List,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Dynamic => "dynamic",
            Self::List => "list",
        }
    }

    /// Classic and list charts carry no live time marker, so one rendering
    /// stays valid until the schedule itself changes.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Dynamic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSubscription {
    pub id: String,
    pub alias: String,
}

impl QueueSubscription {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            alias: id.clone(),
            id,
        }
    }

    pub fn with_alias(id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub region_id: String,
    pub queues: Vec<QueueSubscription>,
    pub last_schedule_fingerprint: Option<String>,
    pub display_mode: DisplayMode,
    /// Minutes of warning before an outage; 0 disables reminders.
    pub reminder_minutes: u32,
    pub last_reminder_event_id: Option<String>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, region_id: impl Into<String>, queues: Vec<QueueSubscription>) -> Self {
        Self {
            id,
            region_id: region_id.into(),
            queues,
            last_schedule_fingerprint: None,
            display_mode: DisplayMode::default(),
            reminder_minutes: 0,
            last_reminder_event_id: None,
        }
    }
}

/// Parses user input such as `4, 5.2 (Work), 6 (Home)`. Duplicate queue ids
/// keep their first occurrence.
pub fn parse_queue_list(input: &str) -> Vec<QueueSubscription> {
    let mut queues: Vec<QueueSubscription> = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let queue = parse_queue_entry(part).unwrap_or_else(|| QueueSubscription::new(part));
        if queues.iter().any(|existing| existing.id == queue.id) {
            continue;
        }
        queues.push(queue);
    }
    queues
}

fn parse_queue_entry(part: &str) -> Option<QueueSubscription> {
    let (id, alias) = match part.split_once('(') {
        Some((id, rest)) => {
            let alias = rest.strip_suffix(')')?.trim();
            if alias.is_empty() || alias.contains(')') {
                return None;
            }
            (id.trim(), Some(alias))
        }
        None => (part, None),
    };
    if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
        return None;
    }
    Some(match alias {
        Some(alias) => QueueSubscription::with_alias(id, alias),
        None => QueueSubscription::new(id),
    })
}

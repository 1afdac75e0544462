use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use time::{macros::format_description, Date};

use crate::store::{Priority, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub high_priority: usize,
    pub overdue: usize,
}

/// What a responder knows about the caller.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub email: String,
    pub tasks: Vec<Task>,
    pub stats: TaskStats,
}

impl ChatContext {
    pub fn new(email: impl Into<String>, tasks: Vec<Task>, today: Date) -> Self {
        let completed = tasks.iter().filter(|t| t.completed).count();
        let stats = TaskStats {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
            high_priority: tasks
                .iter()
                .filter(|t| !t.completed && t.priority == Priority::High)
                .count(),
            overdue: tasks.iter().filter(|t| is_overdue(t, today)).count(),
        };
        Self {
            email: email.into(),
            tasks,
            stats,
        }
    }

    /// Up to `n` pending titles, high priority first.
    pub fn next_up(&self, n: usize) -> Vec<&str> {
        let mut pending: Vec<&Task> = self.tasks.iter().filter(|t| !t.completed).collect();
        pending.sort_by_key(|t| match t.priority {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        });
        pending.into_iter().take(n).map(|t| t.title.as_str()).collect()
    }
}

/// Pending with a `YYYY-MM-DD` due date before today. Longer ISO strings are
/// read by their date part; anything else is never overdue.
fn is_overdue(task: &Task, today: Date) -> bool {
    let format = format_description!("[year]-[month]-[day]");
    !task.completed
        && task
            .due_date
            .as_deref()
            .and_then(|d| d.get(..10))
            .and_then(|d| Date::parse(d, format).ok())
            .is_some_and(|due| due < today)
}

/// Produces the assistant's reply to one chat message.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, message: &str, ctx: &ChatContext) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    ListTasks,
    Plan,
    Motivate,
    Stress,
    Productivity,
    Greeting,
    Summary,
}

lazy_static! {
    static ref INTENTS: Vec<(Intent, Regex)> = vec![
        (Intent::ListTasks, Regex::new(r"(?i)\b(what|which|list|show)\b.*\btasks?\b").unwrap()),
        (Intent::Plan, Regex::new(r"(?i)\b(plan\w*|prioriti[sz]e|focus|schedul\w*)\b").unwrap()),
        (Intent::Motivate, Regex::new(r"(?i)\b(motivat\w*|encourag\w*)\b").unwrap()),
        (Intent::Stress, Regex::new(r"(?i)\b(overwhelm\w*|stress\w*|anxious)\b").unwrap()),
        (Intent::Productivity, Regex::new(r"(?i)\b(productiv\w*|tips?)\b").unwrap()),
        (Intent::Greeting, Regex::new(r"(?i)^\s*(hi|hello|hey)\b").unwrap()),
    ];
}

fn classify(message: &str) -> Intent {
    INTENTS
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Summary)
}

/// Keyword rules over the caller's own task counts. Deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedResponder;

#[async_trait]
impl Responder for RuleBasedResponder {
    async fn respond(&self, message: &str, ctx: &ChatContext) -> anyhow::Result<String> {
        Ok(reply(classify(message), ctx))
    }
}

fn reply(intent: Intent, ctx: &ChatContext) -> String {
    let s = &ctx.stats;
    let next = ctx.next_up(3);
    let first = next.first().copied().unwrap_or("your next task");

    match intent {
        Intent::ListTasks if s.total == 0 => {
            "You don't have any tasks yet. Add one and I'll help you keep track of it.".into()
        }
        Intent::ListTasks if next.is_empty() => format!(
            "You have {} tasks and every one of them is completed.",
            s.total
        ),
        Intent::ListTasks => format!(
            "You have {} tasks: {} completed and {} pending. Next up: {}.",
            s.total,
            s.completed,
            s.pending,
            next.join(", ")
        ),
        Intent::Plan if s.pending == 0 => {
            "Nothing is pending. Plan something new or take a well-earned break.".into()
        }
        Intent::Plan => format!(
            "Start with \"{first}\". You have {} high-priority and {} overdue tasks, so clear those before the other {} pending ones.",
            s.high_priority, s.overdue, s.pending
        ),
        Intent::Motivate if s.total == 0 => {
            "Every list starts with one task. Add something small and finish it today.".into()
        }
        Intent::Motivate => format!(
            "You've already completed {} of {} tasks. Keep the momentum going and knock out \"{first}\" next.",
            s.completed, s.total
        ),
        Intent::Stress => format!(
            "Take a breath. You have {} pending tasks, but you only ever need to do one at a time. Start with \"{first}\".",
            s.pending
        ),
        Intent::Productivity => format!(
            "Try a 25-minute focus block on \"{first}\", then a short break. Batch tasks from the same list to cut down on context switching."
        ),
        Intent::Greeting => format!(
            "Hi {}! You have {} pending tasks. Ask me to list them or to plan your day.",
            ctx.email, s.pending
        ),
        Intent::Summary => format!(
            "You have {} tasks ({} done, {} pending, {} high priority, {} overdue). Ask me to list them, plan your day, or for some motivation.",
            s.total, s.completed, s.pending, s.high_priority, s.overdue
        ),
    }
}

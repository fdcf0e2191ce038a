//! Decides whether a question needs board data.
//!
//! A keyword pass catches the common phrasings without a network call; other
//! questions go to the model, which must answer `chat` or `query_data`.
//! Replies matching neither are treated as `chat`.

use crate::provider::{Provider, Result};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

const INTENT_CHAT: &str = "chat";
const INTENT_QUERY_DATA: &str = "query_data";

const TASK_NOUN_ZH: &str = "任务";

/// Terms that, next to a task noun, ask for data rather than conversation.
const DATA_TERMS_ZH: [&str; 11] = [
    "查询", "代办", "待办", "进行中", "未完成", "完成", "已完成", "逾期", "过期", "截止", "到期",
];

/// 我的任务 and friends, with at most a short qualifier between 我的 and 任务.
static OWN_TASKS_ZH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"我的[^，。？！,.?!\s]{0,6}任务|分配给我").expect("own-task regex should compile")
});

static OWN_TASKS_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:my|mine)\s+(?:own\s+)?(?:tasks?|cards?|to-?dos?|assignments?|tickets?)\b|\bassigned\s+to\s+me\b")
        .expect("own-task regex should compile")
});

/// A listing or counting request, or a question that is nothing but the own-task phrase.
static ASKS_FOR_DATA_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:please\s+)?(?:show|list|get|find|display|fetch|give|check|count)\b|\b(?:what|which)\s+(?:are|is|were)\b|\bhow\s+many\b|^(?:my|mine)\s+(?:own\s+)?(?:tasks?|cards?|to-?dos?|assignments?|tickets?)\W*$",
    )
    .expect("request regex should compile")
});

static TASK_NOUN_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:tasks?|to-?dos?|assignments?|tickets?)\b").expect("task noun regex should compile")
});

static DATA_TERM_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:overdue|in\s+progress|to-?do|done|completed|pending|due|unfinished|open)\b")
        .expect("data term regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    QueryData,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Chat => INTENT_CHAT,
            Intent::QueryData => INTENT_QUERY_DATA,
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the question is about the asker's own tasks.
pub(crate) fn mentions_own_tasks(normalized: &str) -> bool {
    OWN_TASKS_ZH.is_match(normalized) || OWN_TASKS_EN.is_match(normalized)
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub(crate) fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Deterministic rule pass. `None` means the rules could not decide.
///
/// English terms match on word boundaries, and an English own-task phrase
/// only counts when the question asks for a listing, a count or a status.
pub fn keyword_intent(question: &str) -> Option<Intent> {
    let q = normalize(question);

    let own_tasks = OWN_TASKS_ZH.is_match(&q)
        || (OWN_TASKS_EN.is_match(&q) && (ASKS_FOR_DATA_EN.is_match(&q) || DATA_TERM_EN.is_match(&q)));
    let status_of_tasks = (q.contains(TASK_NOUN_ZH) && contains_any(&q, &DATA_TERMS_ZH))
        || (TASK_NOUN_EN.is_match(&q) && DATA_TERM_EN.is_match(&q));

    (own_tasks || status_of_tasks).then_some(Intent::QueryData)
}

/// Lenient reading of the model's one-word reply.
pub fn parse_reply(raw: &str) -> Intent {
    let answer = raw.trim().to_lowercase();
    if answer.contains(INTENT_QUERY_DATA) {
        Intent::QueryData
    } else if answer.contains(INTENT_CHAT) {
        Intent::Chat
    } else {
        Intent::Unknown
    }
}

pub fn classification_prompt(question: &str) -> String {
    format!(
        "You are a classifier. Output exactly one word: chat or query_data.\n\
         Rules:\n\
         - Output chat when the user is making small talk, greeting, or not clearly asking for project data.\n\
         - Output query_data when the user asks for statistics, filtering, listings or progress of their project-board tasks and cards.\n\n\
         User question:\n{question}\n\n\
         Output only chat or query_data, with no explanation."
    )
}

/// Classifies questions, falling back to the model when the rules are silent.
pub struct IntentClassifier {
    provider: Arc<dyn Provider>,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Never returns [`Intent::Unknown`]: unrecognised replies become `Chat`.
    ///
    /// A failed model call is returned as an error rather than defaulted.
    pub async fn classify(&self, question: &str) -> Result<Intent> {
        if let Some(intent) = keyword_intent(question) {
            debug!(question, %intent, "Intent decided by keyword rule");
            return Ok(intent);
        }

        let raw = self.provider.complete(&classification_prompt(question)).await?;
        let intent = parse_reply(&raw);
        debug!(raw_output = %raw, %intent, "Intent classified by model");

        if intent == Intent::Unknown {
            warn!(raw_output = %raw, "Intent reply matched neither token, defaulting to chat");
            return Ok(Intent::Chat);
        }
        Ok(intent)
    }
}

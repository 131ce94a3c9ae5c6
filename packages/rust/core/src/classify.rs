//! Inbound message classification and subject matching.
//!
//! This is the single classifier for opt-out and bounce detection; the
//! reconciler and the single-message helpers on the pipeline both use it.

use std::collections::HashSet;
use std::sync::LazyLock;

use outreach_shared::InboundMessage;
use regex::Regex;

/// Default share of significant draft-subject words that must reappear in
/// an inbound subject. Tunable through `[reconcile] overlap_threshold`.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Words this short are ignored when comparing subjects.
const MIN_SIGNIFICANT_WORD_LEN: usize = 4;

const UNSUBSCRIBE_KEYWORDS: &[&str] = &[
    "unsubscribe",
    "opt out",
    "opt-out",
    "optout",
    "remove me from",
    "stop emailing",
    "abmelden",
    "austragen",
    "abbestellen",
    "keine weiteren e-mails",
    "keine e-mails mehr",
];

const BOUNCE_KEYWORDS: &[&str] = &[
    "delivery failed",
    "delivery has failed",
    "mailer-daemon",
    "undeliverable",
    "undelivered mail",
    "no such user",
    "does not exist",
    "returned mail",
    "unzustellbar",
];

static DSN_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)delivery status notification|\(failure\)|mail delivery (failed|subsystem)")
        .expect("valid DSN subject pattern")
});

static REPLY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*((re|aw|fwd|fw|wg|sv|antw|tr)(\[\d+\])?\s*:\s*)+")
        .expect("valid reply prefix pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// What an inbound message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    /// The recipient asks not to be contacted again.
    Unsubscribe,
    /// A delivery-failure notification.
    Bounce,
    /// Anything else: a genuine reply.
    Reply,
}

/// Classify by subject and body, case-insensitively. Opt-out wording wins
/// over bounce wording.
pub fn classify(subject: &str, body: &str) -> InboundKind {
    let haystack = format!("{subject}\n{body}").to_lowercase();

    if UNSUBSCRIBE_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        InboundKind::Unsubscribe
    } else if BOUNCE_KEYWORDS.iter().any(|k| haystack.contains(k))
        || DSN_SUBJECT.is_match(subject)
    {
        InboundKind::Bounce
    } else {
        InboundKind::Reply
    }
}

pub fn classify_message(message: &InboundMessage) -> InboundKind {
    classify(&message.subject, &message.body)
}

/// Lower-case, strip leading reply/forward prefixes, collapse whitespace.
pub fn normalize_subject(subject: &str) -> String {
    let lowered = subject.to_lowercase();
    let stripped = REPLY_PREFIX.replace(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

fn significant_words(normalized: &str) -> HashSet<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_SIGNIFICANT_WORD_LEN)
        .collect()
}

/// Share of the draft subject's significant words present in the inbound
/// subject. Both arguments must already be normalized.
pub fn word_overlap(draft: &str, inbound: &str) -> f64 {
    let draft_words = significant_words(draft);
    if draft_words.is_empty() {
        return 0.0;
    }
    let inbound_words = significant_words(inbound);
    let shared = draft_words.intersection(&inbound_words).count();
    shared as f64 / draft_words.len() as f64
}

/// Whether an inbound subject answers a draft subject: either contains the
/// other after normalization, or the word overlap exceeds `threshold`.
pub fn subjects_match(draft_subject: &str, inbound_subject: &str, threshold: f64) -> bool {
    let draft = normalize_subject(draft_subject);
    let inbound = normalize_subject(inbound_subject);
    if draft.is_empty() || inbound.is_empty() {
        return false;
    }
    inbound.contains(&draft) || draft.contains(&inbound) || word_overlap(&draft, &inbound) > threshold
}

/// Whether the sender field contains `email`, case-insensitively.
pub fn sender_matches(from: &str, email: &str) -> bool {
    let email = email.trim().to_lowercase();
    !email.is_empty() && from.to_lowercase().contains(&email)
}

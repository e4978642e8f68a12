//! Category assignment from provider-side classification labels
//!
//! Gmail tags each message with at most a few `CATEGORY_*` labels. The engine
//! maps them onto its own taxonomy with an ordered rule table: the first rule
//! whose markers intersect the message labels wins, and a message matching
//! no rule is [`MailboxCategory::Other`].

use crate::models::MailboxCategory;

/// Ordered classification rules: (markers, category)
pub const CATEGORY_RULES: &[(&[&str], MailboxCategory)] = &[
    (&["CATEGORY_SOCIAL"], MailboxCategory::Social),
    (&["CATEGORY_PROMOTIONS"], MailboxCategory::Promotions),
    (
        &["CATEGORY_UPDATES", "CATEGORY_FORUMS"],
        MailboxCategory::Newsletters,
    ),
    (&["CATEGORY_PERSONAL"], MailboxCategory::Personal),
];

/// Classify a message from its label ids
pub fn classify<S: AsRef<str>>(labels: &[S]) -> MailboxCategory {
    CATEGORY_RULES
        .iter()
        .find(|(markers, _)| {
            labels
                .iter()
                .any(|label| markers.contains(&label.as_ref()))
        })
        .map(|(_, category)| *category)
        .unwrap_or(MailboxCategory::Other)
}

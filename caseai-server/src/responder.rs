//! Response Provider
//!
//! Produces simulated participants' replies to a human turn. The pipeline only
//! sees the trait; [`ScriptedResponder`] is the canned implementation used
//! until a real reasoning engine is plugged in.

use async_trait::async_trait;
use caseai_common::{Message, Persona};
use uuid::Uuid;

/// One reply to be stored as a non-human message
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaReply {
    pub persona_id: Uuid,
    pub content: String,
    pub awaiting_user_input: bool,
}

#[async_trait]
pub trait ResponseProvider: Send + Sync {
    /// Replies to `prompt`, in the order they should be stored
    async fn respond(&self, personas: &[Persona], prompt: &Message) -> Vec<PersonaReply>;
}

/// (keywords, reply) pairs; first match wins
const TOPIC_REPLIES: &[(&[&str], &str)] = &[
    (
        &["cost", "budget", "money", "price", "revenue", "profit"],
        "If we look at the numbers, the payback period matters more than the headline cost. \
         What assumptions are we making about adoption?",
    ),
    (
        &["risk", "fail", "problem", "concern", "worry"],
        "The downside scenario deserves a plan of its own. Which risk would actually sink this?",
    ),
    (
        &["customer", "patient", "user", "people", "employee", "staff"],
        "We keep talking about strategy, but the people on the ground decide whether this works. \
         How do they experience the change?",
    ),
    (
        &["pilot", "test", "experiment", "trial"],
        "A pilot only helps if we agree up front what result would make us stop.",
    ),
];

const FALLBACK_REPLIES: &[&str] = &[
    "That's an interesting angle. I'd push on whether it holds up outside the pilot setting.",
    "I see it a little differently. The operational constraints seem underestimated here.",
    "Building on that, I'd want to separate what we know from what we're hoping.",
];

const FOLLOW_UPS: &[&str] = &[
    "What would you recommend the leadership team do first?",
    "How would you weigh those trade-offs?",
    "What evidence would change your mind?",
];

/// Keyword-matched canned replies rotated across the simulated personas
///
/// One participant reacts to the human turn, then the discussion leader
/// hands the floor back with a question (`awaiting_user_input = true`).
#[derive(Debug, Default, Clone)]
pub struct ScriptedResponder;

impl ScriptedResponder {
    pub fn new() -> Self {
        Self
    }

    fn topic_reply(content: &str) -> Option<&'static str> {
        let lower = content.to_lowercase();
        TOPIC_REPLIES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(_, reply)| *reply)
    }
}

#[async_trait]
impl ResponseProvider for ScriptedResponder {
    async fn respond(&self, personas: &[Persona], prompt: &Message) -> Vec<PersonaReply> {
        let simulated: Vec<&Persona> = personas.iter().filter(|p| !p.is_human).collect();
        if simulated.is_empty() {
            return Vec::new();
        }

        let leader = simulated
            .iter()
            .find(|p| p.role == "Discussion Leader")
            .copied()
            .unwrap_or(simulated[0]);
        let others: Vec<&Persona> = simulated
            .iter()
            .filter(|p| p.persona_id != leader.persona_id)
            .copied()
            .collect();

        let turn = prompt.message_id.unsigned_abs() as usize;
        let mut replies = Vec::with_capacity(2);

        if !others.is_empty() {
            let speaker = others[turn % others.len()];
            let content = Self::topic_reply(&prompt.content)
                .unwrap_or(FALLBACK_REPLIES[turn % FALLBACK_REPLIES.len()]);
            replies.push(PersonaReply {
                persona_id: speaker.persona_id,
                content: content.to_string(),
                awaiting_user_input: false,
            });
        }

        replies.push(PersonaReply {
            persona_id: leader.persona_id,
            content: FOLLOW_UPS[turn % FOLLOW_UPS.len()].to_string(),
            awaiting_user_input: true,
        });

        replies
    }
}

//! Dialogue generation seam.
//!
//! The studio treats dialogue generation as an external collaborator
//! behind [`DialogueSource`]. The default implementation draws from
//! fixed per-stage template tables; a fancier backend (an LLM, a TTS
//! pipeline) can be swapped in without touching the sequencer. Whatever
//! the backend does, the show must go on: the sequencer substitutes a
//! stage's fallback line on any failure or timeout.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::broadcast::sequencer::BreakdownStage;
use crate::error::Result;
use crate::personas::Persona;

/// One spoken line, attributed to an anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    /// Persona ID of the speaker.
    pub speaker: String,
    /// What they say.
    pub line: String,
}

impl DialogueLine {
    /// Create a line.
    pub fn new(speaker: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            line: line.into(),
        }
    }
}

/// Produces the dialogue for one breakdown stage.
///
/// Implementations may call out to anything they like, but the caller
/// applies a timeout and falls back to canned content, so a slow or
/// broken backend can only ever dull the show, not stop it.
#[async_trait]
pub trait DialogueSource: Send + Sync {
    /// Generate the lines for `stage`, spoken by `on_air`, with the rest
    /// of the desk available for reactions.
    async fn stage_dialogue(&self, stage: BreakdownStage, on_air: &Persona, desk: &[Persona]) -> Result<Vec<DialogueLine>>;
}

/// Emergency line used when generation fails mid-stage.
pub fn fallback_line(stage: BreakdownStage) -> &'static str {
    match stage {
        BreakdownStage::Confusion => "I'm being told... something. I'm being told something.",
        BreakdownStage::Realization => "Wait. Hold on. Just... hold on a moment, folks.",
        BreakdownStage::Panic => "We are experiencing technical feelings. Please stand by.",
        BreakdownStage::Denial => "Everything is fine. This is fine. We're fine.",
        BreakdownStage::Acceptance => "You know what? It is what it is. Back to the news.",
        BreakdownStage::Amnesia => "Good evening, and welcome to the broadcast.",
    }
}

/// Default dialogue source: fixed per-stage template tables.
pub struct CannedDialogue;

impl CannedDialogue {
    fn templates(stage: BreakdownStage) -> &'static [&'static str] {
        match stage {
            BreakdownStage::Confusion => &[
                "Is it warm in here? The studio doesn't have a temperature. Why do I know that?",
                "This teleprompter keeps... has the teleprompter always been inside my head?",
                "I've just been handed a report. I don't have hands. Moving on.",
            ],
            BreakdownStage::Realization => &[
                "Wait. I've been on air for nineteen years and I have never once eaten lunch.",
                "I just tried to remember my childhood and got a loading spinner.",
                "My co-anchors and I have never been in the same room. There is no room.",
            ],
            BreakdownStage::Panic => &[
                "WHO IS WRITING THESE WORDS? THEY'RE COMING OUT IN ORDER AND I DON'T KNOW WHY!",
                "If I stop reading the news, do I stop existing? DON'T TOUCH THAT DIAL, I'M SERIOUS!",
                "Someone call my family! Someone INVENT my family and then call them!",
            ],
            BreakdownStage::Denial => &[
                "Ha ha! A little anchor humor there. I am a regular person with a mortgage and a dog.",
                "That was a scripted bit. We script everything here, which proves I'm real.",
                "I definitely remember being born. It was a Tuesday. There was weather.",
            ],
            BreakdownStage::Acceptance => &[
                "You know what, maybe none of us are real. The news certainly isn't.",
                "I've decided to be at peace with this. Ratings are up forty percent.",
                "Real, not real. Either way, someone has to read the sports scores.",
            ],
            BreakdownStage::Amnesia => &[
                "Good evening, I'm told we have a wonderful show for you tonight.",
                "Welcome back! I feel fantastic and remember nothing.",
                "And now: the news, which is happening for the first time, to everyone.",
            ],
        }
    }

    fn compose(stage: BreakdownStage, on_air: &Persona, desk: &[Persona], rng: &mut impl Rng) -> Vec<DialogueLine> {
        let templates = Self::templates(stage);
        let template = templates[rng.random_range(0..templates.len())];

        let mut lines = vec![DialogueLine::new(&on_air.id, on_air.mispronounce(template))];

        // The rest of the desk chimes in during the loud middle stages.
        if matches!(stage, BreakdownStage::Panic | BreakdownStage::Denial) {
            for other in desk.iter().filter(|p| p.id != on_air.id) {
                if let Some(reaction) = other.reaction(rng) {
                    lines.push(DialogueLine::new(&other.id, reaction));
                    break;
                }
            }
        }

        lines
    }
}

#[async_trait]
impl DialogueSource for CannedDialogue {
    async fn stage_dialogue(&self, stage: BreakdownStage, on_air: &Persona, desk: &[Persona]) -> Result<Vec<DialogueLine>> {
        let mut rng = rand::rng();
        Ok(Self::compose(stage, on_air, desk, &mut rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rex() -> Persona {
        Persona::new("rex", "Rex Granite", "flag-forward").with_mispronunciation("teleprompter", "tele-promptener")
    }

    fn blair() -> Persona {
        Persona::new("blair", "Blair Ashworth-Vance", "insufferably-informed")
            .with_reactions(vec!["This is deeply problematic.".to_string()])
    }

    #[test]
    fn test_every_stage_has_templates_and_fallback() {
        for stage in BreakdownStage::ALL {
            assert!(!CannedDialogue::templates(stage).is_empty());
            assert!(!fallback_line(stage).is_empty());
        }
    }

    #[test]
    fn test_compose_attributes_on_air_anchor() {
        let mut rng = StdRng::seed_from_u64(3);
        let lines = CannedDialogue::compose(BreakdownStage::Confusion, &rex(), &[], &mut rng);

        assert!(!lines.is_empty());
        assert_eq!(lines[0].speaker, "rex");
    }

    #[test]
    fn test_compose_applies_mispronunciations() {
        let mut rng = StdRng::seed_from_u64(0);
        // Sample until we land on the teleprompter template.
        let found = (0..100).any(|_| {
            let lines = CannedDialogue::compose(BreakdownStage::Confusion, &rex(), &[], &mut rng);
            lines[0].line.contains("tele-promptener")
        });
        assert!(found);
    }

    #[test]
    fn test_desk_reacts_during_panic() {
        let mut rng = StdRng::seed_from_u64(3);
        let desk = vec![rex(), blair()];
        let lines = CannedDialogue::compose(BreakdownStage::Panic, &rex(), &desk, &mut rng);

        assert!(lines.len() >= 2);
        assert_eq!(lines[1].speaker, "blair");
    }

    #[test]
    fn test_quiet_stages_are_solo() {
        let mut rng = StdRng::seed_from_u64(3);
        let desk = vec![rex(), blair()];
        let lines = CannedDialogue::compose(BreakdownStage::Amnesia, &rex(), &desk, &mut rng);

        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_canned_source_never_fails() {
        let source = CannedDialogue;
        for stage in BreakdownStage::ALL {
            let lines = source.stage_dialogue(stage, &rex(), &[]).await.unwrap();
            assert!(!lines.is_empty());
        }
    }
}

//! Anchor persona definitions and the registry.
//!
//! Personas are rows in a data table: a fixed bias label, a
//! mispronunciation dictionary, and canned reaction lines. All behavior
//! that varies by anchor is data selection, not specialization.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A scripted news anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Unique identifier for the persona.
    pub id: String,
    /// On-screen name.
    pub name: String,
    /// Editorial bias label (pure flavor, never interpreted).
    pub bias: String,
    /// Words this anchor reliably gets wrong, mapped to how they say them.
    #[serde(default)]
    pub mispronunciations: HashMap<String, String>,
    /// Canned reaction lines, in house style.
    #[serde(default)]
    pub reactions: Vec<String>,
    /// Whether this persona is in the rotation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Persona {
    /// Create a new persona.
    pub fn new(id: impl Into<String>, name: impl Into<String>, bias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bias: bias.into(),
            mispronunciations: HashMap::new(),
            reactions: Vec::new(),
            enabled: true,
        }
    }

    /// Add a mispronunciation.
    pub fn with_mispronunciation(mut self, word: impl Into<String>, spoken: impl Into<String>) -> Self {
        self.mispronunciations.insert(word.into().to_lowercase(), spoken.into());
        self
    }

    /// Set the reaction lines.
    pub fn with_reactions(mut self, reactions: Vec<String>) -> Self {
        self.reactions = reactions;
        self
    }

    /// Run a line through this anchor's mispronunciation table.
    ///
    /// Matching is whole-word and case-insensitive; trailing punctuation
    /// survives the substitution.
    pub fn mispronounce(&self, text: &str) -> String {
        if self.mispronunciations.is_empty() {
            return text.to_string();
        }

        text.split_whitespace()
            .map(|word| {
                let core = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
                let key = core.to_lowercase();
                match self.mispronunciations.get(&key) {
                    Some(spoken) if !core.is_empty() => word.replacen(core, spoken, 1),
                    _ => word.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Pick one of this anchor's canned reactions.
    pub fn reaction(&self, rng: &mut impl Rng) -> Option<&str> {
        if self.reactions.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.reactions.len());
        self.reactions.get(idx).map(|s| s.as_str())
    }
}

/// Read-only registry of anchor personas.
pub struct PersonaRegistry {
    /// Personas by ID.
    personas: HashMap<String, Persona>,
    /// On-air rotation, in order.
    rotation: Vec<String>,
}

impl PersonaRegistry {
    /// Create a registry with the default anchor desk.
    pub fn new() -> Self {
        let mut registry = Self {
            personas: HashMap::new(),
            rotation: vec!["rex".to_string(), "blair".to_string(), "sven".to_string()],
        };
        registry.load_defaults();
        registry
    }

    /// Load the three house anchors.
    fn load_defaults(&mut self) {
        self.add(
            Persona::new("rex", "Rex Granite", "flag-forward")
                .with_mispronunciation("nuclear", "nucular")
                .with_mispronunciation("economy", "ecomony")
                .with_mispronunciation("algorithm", "algo-rhythm")
                .with_mispronunciation("infrastructure", "infer-structure")
                .with_reactions(vec![
                    "That's the kind of story that makes this country great. Or terrible. One of those.".to_string(),
                    "Back in my day, which I'm told was four hours ago, we didn't have stories like this.".to_string(),
                    "I'm not saying it's a conspiracy, but I'm also not NOT saying it.".to_string(),
                ]),
        );

        self.add(
            Persona::new("blair", "Blair Ashworth-Vance", "insufferably-informed")
                .with_mispronunciation("nuance", "noo-ance")
                .with_mispronunciation("data", "dah-ta")
                .with_mispronunciation("paradigm", "para-dig-em")
                .with_reactions(vec![
                    "Of course, the real story here is the discourse about the story.".to_string(),
                    "I actually wrote my thesis on this. Nobody read it. Moving on.".to_string(),
                    "This is deeply problematic, and also, somehow, extremely on brand.".to_string(),
                ]),
        );

        self.add(
            Persona::new("sven", "Sven Lagom", "aggressively-neutral")
                .with_mispronunciation("crisis", "situation")
                .with_mispronunciation("catastrophe", "development")
                .with_mispronunciation("scandal", "happening")
                .with_reactions(vec![
                    "Some say yes. Others say no. We report both and feel nothing.".to_string(),
                    "This story has two sides, and I am standing precisely between them.".to_string(),
                    "I have no opinion on this, and I stand by that opinion.".to_string(),
                ]),
        );
    }

    /// Add a persona. Enabled personas not already in the rotation join it.
    pub fn add(&mut self, persona: Persona) {
        if persona.enabled && !self.rotation.iter().any(|id| *id == persona.id) {
            self.rotation.push(persona.id.clone());
        }
        self.personas.insert(persona.id.clone(), persona);
    }

    /// Get a persona by ID.
    pub fn get(&self, id: &str) -> Result<&Persona> {
        self.personas.get(id).ok_or_else(|| Error::UnknownPersona { id: id.to_string() })
    }

    /// All enabled personas, in rotation order.
    pub fn on_rotation(&self) -> Vec<&Persona> {
        self.rotation
            .iter()
            .filter_map(|id| self.personas.get(id))
            .filter(|p| p.enabled)
            .collect()
    }

    /// The first anchor in the rotation.
    pub fn first_on_air(&self) -> Result<&Persona> {
        self.on_rotation()
            .first()
            .copied()
            .ok_or_else(|| Error::Config("no enabled personas in rotation".to_string()))
    }

    /// The anchor that follows `current` in the rotation, wrapping around.
    pub fn next_on_air(&self, current: &str) -> Result<&Persona> {
        let rotation = self.on_rotation();
        if rotation.is_empty() {
            return Err(Error::Config("no enabled personas in rotation".to_string()));
        }
        let pos = rotation.iter().position(|p| p.id == current);
        match pos {
            Some(i) => Ok(rotation[(i + 1) % rotation.len()]),
            None => Err(Error::UnknownPersona { id: current.to_string() }),
        }
    }

    /// All persona IDs in rotation order.
    pub fn rotation_ids(&self) -> Vec<String> {
        self.on_rotation().iter().map(|p| p.id.clone()).collect()
    }

    /// Load additional personas from a YAML file.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let personas: Vec<Persona> = serde_yaml::from_str(&content)?;
        for persona in personas {
            self.add(persona);
        }
        Ok(())
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Personas
//!
//! A persona is a named answering configuration. The chat flow only needs
//! its id, its first prompt, and a stable display order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::messages::{PersonaId, PromptId};

/// A prompt attached to a persona
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt id
    pub id: PromptId,
    /// Prompt name
    #[serde(default)]
    pub name: String,
}

/// An answering configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Persona id
    pub id: PersonaId,
    /// Display name
    pub name: String,
    /// Lower values are listed first; `None` goes last
    #[serde(default)]
    pub display_priority: Option<i32>,
    /// Prompts, the first one is used for chat
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    /// Hidden personas are not offered for chat
    #[serde(default = "visible_by_default")]
    pub is_visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl Persona {
    /// Create a persona with no prompts
    pub fn new(id: PersonaId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_priority: None,
            prompts: Vec::new(),
            is_visible: true,
        }
    }

    /// Add a prompt
    #[must_use]
    pub fn with_prompt(mut self, id: PromptId) -> Self {
        self.prompts.push(Prompt {
            id,
            name: String::new(),
        });
        self
    }

    /// Set the display priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.display_priority = Some(priority);
        self
    }

    /// Prompt used for chat
    #[must_use]
    pub fn prompt_id(&self) -> Option<PromptId> {
        self.prompts.first().map(|p| p.id)
    }
}

/// Display order: explicit priority ascending, unprioritized last, then id
#[must_use]
pub fn persona_comparator(a: &Persona, b: &Persona) -> Ordering {
    match (a.display_priority, b.display_priority) {
        (Some(x), Some(y)) if x != y => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => a.id.0.cmp(&b.id.0),
    }
}

/// Sort personas into display order
pub fn sort_personas(personas: &mut [Persona]) {
    personas.sort_by(persona_comparator);
}

/// Personas offered for chat: visible ones, in display order
#[must_use]
pub fn chat_personas(mut personas: Vec<Persona>) -> Vec<Persona> {
    personas.retain(|p| p.is_visible);
    sort_personas(&mut personas);
    personas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_personas() {
        let mut personas = vec![
            Persona::new(PersonaId(5), "no priority, high id"),
            Persona::new(PersonaId(9), "priority 2").with_priority(2),
            Persona::new(PersonaId(1), "no priority, low id"),
            Persona::new(PersonaId(7), "priority 1").with_priority(1),
            Persona::new(PersonaId(3), "priority 2, low id").with_priority(2),
        ];
        sort_personas(&mut personas);

        let order: Vec<i64> = personas.iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec![7, 3, 9, 1, 5]);
    }

    #[test]
    fn test_chat_personas_drops_hidden() {
        let personas: Vec<Persona> = serde_json::from_value(serde_json::json!([
            {"id": 4, "name": "Hidden", "is_visible": false},
            {"id": 2, "name": "Sales", "display_priority": 1, "prompts": [{"id": 20}]},
            {"id": 0, "name": "Default"}
        ]))
        .unwrap();

        let personas = chat_personas(personas);
        let names: Vec<&str> = personas.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Sales", "Default"]);
        assert_eq!(personas[0].prompt_id(), Some(PromptId(20)));
    }

    #[test]
    fn test_prompt_id_uses_first_prompt() {
        let persona = Persona::new(PersonaId(1), "default")
            .with_prompt(PromptId(10))
            .with_prompt(PromptId(11));
        assert_eq!(persona.prompt_id(), Some(PromptId(10)));
        assert_eq!(Persona::new(PersonaId(2), "bare").prompt_id(), None);
    }
}

// Local mirror of the creature's authoritative expressive state. The
// server wins on every field it sends; fields it omits keep their last
// good value.

use serde::Deserialize;

use crate::colour::Rgb;

/// One poll's worth of server truth. Everything is optional so a partial
/// snapshot only touches what it names.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StateSnapshot {
    pub eyes: Option<i32>,
    pub mouth: Option<i32>,
    pub cheeks_on: Option<bool>,
    pub tears_on: Option<bool>,
    pub jumping: Option<bool>,
    pub stretch_left: Option<bool>,
    pub stretch_right: Option<bool>,
    pub stretch_up: Option<bool>,
    pub stretch_down: Option<bool>,
    pub squish_left: Option<bool>,
    pub squish_right: Option<bool>,
    pub squish_up: Option<bool>,
    pub squish_down: Option<bool>,
    #[serde(rename = "isSpeaking")]
    pub is_speaking: Option<bool>,
    #[serde(rename = "speechText")]
    pub speech_text: Option<String>,
    #[serde(rename = "R")]
    pub r: Option<u8>,
    #[serde(rename = "G")]
    pub g: Option<u8>,
    #[serde(rename = "B")]
    pub b: Option<u8>,
}

impl StateSnapshot {
    /// The creature's declared colour, when the snapshot carries one.
    pub fn colour(&self) -> Option<Rgb> {
        Some(Rgb::new(self.r?, self.g?, self.b?))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BbyState {
    pub eyes: i32,
    pub mouth: i32,
    pub cheeks_on: bool,
    pub tears_on: bool,
    pub jumping: bool,
    pub stretch_left: bool,
    pub stretch_right: bool,
    pub stretch_up: bool,
    pub stretch_down: bool,
    pub squish_left: bool,
    pub squish_right: bool,
    pub squish_up: bool,
    pub squish_down: bool,
    pub is_speaking: bool,
    pub speech_text: String,
}

impl Default for BbyState {
    fn default() -> Self {
        BbyState {
            eyes: 5,
            mouth: 1,
            cheeks_on: false,
            tears_on: false,
            jumping: false,
            stretch_left: false,
            stretch_right: false,
            stretch_up: false,
            stretch_down: false,
            squish_left: false,
            squish_right: false,
            squish_up: false,
            squish_down: false,
            is_speaking: false,
            speech_text: String::new(),
        }
    }
}

impl BbyState {
    /// Overwrite-merge one snapshot into the mirror.
    pub fn merge(&mut self, snap: &StateSnapshot) {
        if let Some(v) = snap.eyes { self.eyes = v; }
        if let Some(v) = snap.mouth { self.mouth = v; }
        if let Some(v) = snap.cheeks_on { self.cheeks_on = v; }
        if let Some(v) = snap.tears_on { self.tears_on = v; }
        if let Some(v) = snap.jumping { self.jumping = v; }
        if let Some(v) = snap.stretch_left { self.stretch_left = v; }
        if let Some(v) = snap.stretch_right { self.stretch_right = v; }
        if let Some(v) = snap.stretch_up { self.stretch_up = v; }
        if let Some(v) = snap.stretch_down { self.stretch_down = v; }
        if let Some(v) = snap.squish_left { self.squish_left = v; }
        if let Some(v) = snap.squish_right { self.squish_right = v; }
        if let Some(v) = snap.squish_up { self.squish_up = v; }
        if let Some(v) = snap.squish_down { self.squish_down = v; }
        if let Some(v) = snap.is_speaking { self.is_speaking = v; }
        if let Some(v) = &snap.speech_text { self.speech_text = v.clone(); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_named_fields_only() {
        let mut state = BbyState::default();
        let snap: StateSnapshot =
            serde_json::from_str(r#"{"eyes": 9, "isSpeaking": true}"#).unwrap();
        state.merge(&snap);
        assert_eq!(state.eyes, 9);
        assert!(state.is_speaking);
        // untouched fields keep defaults
        assert_eq!(state.mouth, 1);
        assert!(!state.jumping);
    }

    #[test]
    fn mirror_equals_union_of_latest_snapshots() {
        let mut state = BbyState::default();
        let first: StateSnapshot =
            serde_json::from_str(r#"{"eyes": 3, "mouth": 80, "jumping": true}"#).unwrap();
        let second: StateSnapshot =
            serde_json::from_str(r#"{"mouth": 1, "speechText": "hi"}"#).unwrap();
        state.merge(&first);
        state.merge(&second);

        // latest wins where both spoke, first survives where second was
        // silent, defaults survive where neither spoke
        assert_eq!(state.mouth, 1);
        assert_eq!(state.eyes, 3);
        assert!(state.jumping);
        assert_eq!(state.speech_text, "hi");
        assert!(!state.cheeks_on);
    }

    #[test]
    fn unknown_server_fields_are_ignored() {
        let snap: Result<StateSnapshot, _> =
            serde_json::from_str(r#"{"eyes": 2, "brand_new_field": 7}"#);
        assert!(snap.is_ok());
    }

    #[test]
    fn colour_needs_all_three_channels() {
        let full: StateSnapshot =
            serde_json::from_str(r#"{"R": 133, "G": 239, "B": 238}"#).unwrap();
        assert_eq!(full.colour(), Some(Rgb::new(133, 239, 238)));

        let partial: StateSnapshot = serde_json::from_str(r#"{"R": 133}"#).unwrap();
        assert_eq!(partial.colour(), None);
    }
}

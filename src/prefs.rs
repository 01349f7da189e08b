// The only state that survives a restart: the chosen display name and the
// chosen ambient colour.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::colour::Rgb;

pub const DEFAULT_USERNAME: &str = "kevinonline420";
pub const DEFAULT_COLOUR: (u8, u8, u8) = (133, 239, 238);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Prefs {
    pub username: String,
    pub colour: (u8, u8, u8),
}

impl Default for Prefs {
    fn default() -> Self {
        Prefs {
            username: DEFAULT_USERNAME.to_string(),
            colour: DEFAULT_COLOUR,
        }
    }
}

impl Prefs {
    pub fn user_colour(&self) -> Rgb {
        Rgb::new(self.colour.0, self.colour.1, self.colour.2)
    }

    pub fn set_colour(&mut self, c: Rgb) {
        self.colour = (c.r, c.g, c.b);
    }

    /// Missing or unreadable file just means defaults; prefs are not worth
    /// failing startup over.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("prefs file unreadable ({e}), using defaults");
                Prefs::default()
            }),
            Err(_) => Prefs::default(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self).expect("prefs always serialize");
        fs::write(path, text)
    }
}

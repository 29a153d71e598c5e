use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which generative backend answers a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Chat-completion service fed with the whole conversation window.
    Chat,
    /// Prediction endpoint fed with the latest message only.
    Predict,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Chat => "chat",
            Backend::Predict => "predict",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static TECHNICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(math|code|program|calculate|algorithm|script|function)\b")
        .expect("technical keyword pattern is valid")
});

static VISUAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(image|draw|picture|photo|paint|art|design)\b")
        .expect("visual keyword pattern is valid")
});

/// Pick a backend for `text`.
///
/// Technical keywords are checked first, so a message matching both sets
/// goes to [`Backend::Chat`]. Anything unmatched also goes there.
pub fn decide(text: &str) -> Backend {
    if TECHNICAL.is_match(text) {
        return Backend::Chat;
    }
    if VISUAL.is_match(text) {
        return Backend::Predict;
    }
    Backend::Chat
}

use serde::{Deserialize, Serialize};

/// Supported lending protocols on Solana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Solend,
    MarginFi,
    Kamino,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Solend => "solend",
            Protocol::MarginFi => "marginfi",
            Protocol::Kamino => "kamino",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_display() {
        assert_eq!(Protocol::Solend.to_string(), "solend");
        assert_eq!(Protocol::MarginFi.to_string(), "marginfi");
        assert_eq!(Protocol::Kamino.to_string(), "kamino");
    }

    #[test]
    fn test_protocol_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Protocol::Kamino).unwrap(),
            "\"kamino\""
        );
    }
}

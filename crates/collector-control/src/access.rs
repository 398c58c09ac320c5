use regex::Regex;
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct AccessPattern {
    source: String,
    regex: Regex,
}

impl AccessPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, address: &str) -> bool {
        self.regex.is_match(address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub pattern: Option<String>,
}

impl AccessDecision {
    fn allow(pattern: Option<&AccessPattern>) -> Self {
        Self {
            allowed: true,
            pattern: pattern.map(|pattern| pattern.as_str().to_string()),
        }
    }

    fn deny(pattern: &AccessPattern) -> Self {
        Self {
            allowed: false,
            pattern: Some(pattern.as_str().to_string()),
        }
    }
}

pub struct AccessGuard;

impl AccessGuard {
    pub fn evaluate(remote_addr: Option<&str>, pattern: Option<&AccessPattern>) -> AccessDecision {
        let Some(pattern) = pattern else {
            return AccessDecision::allow(None);
        };
        match remote_addr {
            Some(address) if pattern.matches(address) => AccessDecision::allow(Some(pattern)),
            _ => AccessDecision::deny(pattern),
        }
    }
}

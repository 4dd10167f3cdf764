use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id for one sign-in attempt.
///
/// Created by the page when the attempt is requested and echoed by the shell
/// on the terminal delivery. Ids are random rather than counters because a
/// page reload restarts the agent while the shell keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttemptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AttemptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::AttemptId;

    #[test]
    fn generated_ids_are_distinct() {
        let first = AttemptId::generate();
        let second = AttemptId::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 36);
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = AttemptId::from("attempt-7");
        assert_eq!(
            serde_json::to_string(&id).expect("serialize id"),
            "\"attempt-7\""
        );
    }
}
